//! Vocabulary remapping.
//!
//! An operator-supplied file maps batch positions to alternate vocabulary ids.
//! The embedding rows of those ids are averaged into the looked-up rows:
//!
//! ```text
//! out[i] = (chosen[i] + E[map.get(i).unwrap_or(i)]) / 2
//! ```
//!
//! Positions without an entry fall back to the position itself as the
//! vocabulary id.
//!
//! The file is plain text with whitespace-separated `from to` pairs, read as
//! a stream of unsigned integers. Reading stops quietly at end of file or
//! where the next integer cannot be read: a non-digit, a non-UTF-8 byte, or
//! a value out of range. Digits directly followed by garbage (`2x`) still
//! count, reading stops at the garbage. Vocabulary ids are limited to
//! `u32`, the index type of the embedding gather.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use candle_core::Tensor;

use crate::config::Options;
use crate::{Error, Result};

/// Position → replacement vocabulary id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabMap {
    entries: HashMap<usize, u32>,
}

impl VocabMap {
    /// Parse `from to` pairs. Later pairs overwrite earlier ones.
    pub fn from_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let mut entries = HashMap::new();
        let mut numbers = Numbers::new(&bytes);
        loop {
            let Some(from) = numbers.next::<usize>() else {
                break;
            };
            let Some(to) = numbers.next::<u32>() else {
                tracing::warn!("vmap: ignoring position {from} without a readable id");
                break;
            };
            tracing::debug!("{from} -> {to}");
            entries.insert(from, to);
        }
        if !numbers.at_end() {
            tracing::warn!(
                "vmap: stopping at malformed input at byte {} of {}",
                numbers.pos,
                bytes.len()
            );
        }
        Ok(Self { entries })
    }

    /// Read a map file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let vocab_map_err = |source| Error::VocabMap {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::open(path).map_err(vocab_map_err)?;
        let map = Self::from_reader(std::io::BufReader::new(file)).map_err(vocab_map_err)?;
        tracing::info!("Loaded vocabulary map {} ({} entries)", path.display(), map.len());
        Ok(map)
    }

    pub fn get(&self, position: usize) -> Option<u32> {
        self.entries.get(&position).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replacement vocabulary id for each of the first `n` positions.
    ///
    /// Fails if an unmapped position does not fit a `u32` vocabulary id.
    pub fn replacement_ids(&self, n: usize) -> Result<Vec<u32>> {
        (0..n)
            .map(|i| match self.get(i) {
                Some(to) => Ok(to),
                None => u32::try_from(i).map_err(|_| {
                    Error::Batch(format!("position {i} exceeds the u32 vocabulary id range"))
                }),
            })
            .collect()
    }
}

/// Unsigned integers read from a byte buffer the way a text stream
/// extracts them: skip ASCII whitespace, then take the longest run of digits.
struct Numbers<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Numbers<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Next integer, or `None` at end of input or on anything unreadable.
    /// On failure the position is left at the offending byte.
    fn next<T: std::str::FromStr>(&mut self) -> Option<T> {
        self.skip_whitespace();
        let start = self.pos;
        let digits = self.bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits == 0 {
            return None;
        }
        // digits are ASCII, so this is always valid UTF-8
        let value = std::str::from_utf8(&self.bytes[start..start + digits])
            .ok()?
            .parse()
            .ok()?;
        self.pos = start + digits;
        Some(value)
    }

    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos == self.bytes.len()
    }
}

/// Lazily loaded, per-context vocabulary remapper.
///
/// The map is read on first use and kept for the lifetime of this value.
/// The cache is not shared: `VocabRemapper` is `!Sync`, and cloning it for
/// another execution context yields an unloaded cache.
#[derive(Debug, Default)]
pub struct VocabRemapper {
    path: Option<PathBuf>,
    map: OnceCell<VocabMap>,
}

impl Clone for VocabRemapper {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            map: OnceCell::new(),
        }
    }
}

impl VocabRemapper {
    /// Remapper reading from `path`. `None` disables remapping.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            map: OnceCell::new(),
        }
    }

    /// Configure from the `vmap` option. Absent or empty disables remapping.
    pub fn from_options(options: &Options) -> Result<Self> {
        let path: String = options.get_or("vmap", String::new())?;
        Ok(Self::new((!path.is_empty()).then(|| PathBuf::from(path))))
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Whether the map has been read in this context.
    pub fn is_loaded(&self) -> bool {
        self.map.get().is_some()
    }

    /// Blend remapped rows of `source` into `chosen`.
    ///
    /// - `chosen`: `[N, D]` rows already gathered for `indices`
    /// - `source`: `[V, D]` embedding table
    /// - `indices`: the `N` token ids of the sub-batch
    ///
    /// Returns `chosen` unchanged when remapping is disabled.
    pub fn apply(&self, chosen: &Tensor, source: &Tensor, indices: &[u32]) -> Result<Tensor> {
        let Some(path) = &self.path else {
            return Ok(chosen.clone());
        };
        let map = self.load(path)?;

        let ids = map.replacement_ids(indices.len())?;
        let ids = Tensor::from_vec(ids, indices.len(), source.device())?;
        let remapped = source.index_select(&ids, 0)?;
        Ok(((chosen + remapped)? / 2.0)?)
    }

    fn load(&self, path: &Path) -> Result<&VocabMap> {
        if let Some(map) = self.map.get() {
            return Ok(map);
        }
        let map = VocabMap::read(path)?;
        Ok(self.map.get_or_init(|| map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn table(vocab: usize, dim: usize) -> Tensor {
        Tensor::arange(0f32, (vocab * dim) as f32, &Device::Cpu)
            .unwrap()
            .reshape((vocab, dim))
            .unwrap()
    }

    #[test]
    fn test_parse_pairs_last_write_wins() {
        let map = VocabMap::from_reader("0 9\n3 4\n0 7\n".as_bytes()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(0), Some(7));
        assert_eq!(map.get(3), Some(4));
        assert_eq!(map.get(1), None);
    }

    #[test]
    fn test_parse_any_whitespace() {
        let map = VocabMap::from_reader("1\t2 3\n\n4".as_bytes()).unwrap();
        assert_eq!(map.get(1), Some(2));
        assert_eq!(map.get(3), Some(4));
    }

    #[test]
    fn test_parse_stops_at_malformed_token() {
        let map = VocabMap::from_reader("1 2\nx 5\n6 7\n".as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(6), None);

        let map = VocabMap::from_reader("1 2\n3 -4\n".as_bytes()).unwrap();
        assert_eq!(map.len(), 1);

        // odd trailing token is dropped
        let map = VocabMap::from_reader("1 2 3".as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_parse_stops_at_invalid_utf8() {
        let map = VocabMap::from_reader(&b"0 9\n\xff 3\n"[..]).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(0), Some(9));
    }

    #[test]
    fn test_parse_keeps_digits_before_garbage() {
        // "2x": 2 is read, reading stops at 'x'
        let map = VocabMap::from_reader("1 2x 3 4".as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(1), Some(2));
        assert_eq!(map.get(3), None);
    }

    #[test]
    fn test_parse_stops_at_out_of_range_id() {
        let map = VocabMap::from_reader("0 1\n2 4294967296\n5 6\n".as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(0), Some(1));
        assert_eq!(map.get(2), None);
    }

    #[test]
    fn test_replacement_ids_identity_fallback() {
        let map = VocabMap::from_reader("1 42".as_bytes()).unwrap();
        assert_eq!(map.replacement_ids(4).unwrap(), vec![0, 42, 2, 3]);
        assert!(map.replacement_ids(0).unwrap().is_empty());
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = VocabMap::read(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, Error::VocabMap { .. }));
    }

    #[test]
    fn test_disabled_is_noop() {
        let remapper = VocabRemapper::from_options(&Options::new()).unwrap();
        assert!(!remapper.is_enabled());

        let opts = Options::new().with("vmap", "").unwrap();
        let remapper = VocabRemapper::from_options(&opts).unwrap();
        assert!(!remapper.is_enabled());

        let source = table(4, 3);
        let chosen = source.narrow(0, 1, 2).unwrap();
        let out = remapper.apply(&chosen, &source, &[1, 2]).unwrap();
        assert_eq!(
            out.to_vec2::<f32>().unwrap(),
            chosen.to_vec2::<f32>().unwrap()
        );
        assert!(!remapper.is_loaded());
    }

    #[test]
    fn test_apply_blends_mapped_and_fallback_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmap.txt");
        std::fs::write(&path, "1 3\n").unwrap();

        let source = table(4, 2); // row r = [2r, 2r+1]
        let ids = [2u32, 2];
        let chosen = source
            .index_select(&Tensor::new(&ids, &Device::Cpu).unwrap(), 0)
            .unwrap();
        let remapper = VocabRemapper::new(Some(path));
        let out = remapper.apply(&chosen, &source, &ids).unwrap();
        // pos 0: (e2 + e0) / 2, pos 1: (e2 + e3) / 2
        assert_eq!(
            out.to_vec2::<f32>().unwrap(),
            vec![vec![2.0, 3.0], vec![5.0, 6.0]]
        );
    }

    #[test]
    fn test_map_read_once_per_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmap.txt");
        std::fs::write(&path, "0 1\n").unwrap();

        let source = table(3, 2);
        let chosen = source.narrow(0, 0, 1).unwrap();
        let remapper = VocabRemapper::new(Some(path.clone()));
        assert!(!remapper.is_loaded());
        remapper.apply(&chosen, &source, &[0]).unwrap();
        assert!(remapper.is_loaded());

        // Second call must not touch the file again.
        std::fs::remove_file(&path).unwrap();
        let out = remapper.apply(&chosen, &source, &[0]).unwrap();
        assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![1.0, 2.0]]);

        // A clone is a fresh context and has to read the file itself.
        let fresh = remapper.clone();
        assert!(!fresh.is_loaded());
        assert!(matches!(
            fresh.apply(&chosen, &source, &[0]),
            Err(Error::VocabMap { .. })
        ));
    }

    #[test]
    fn test_apply_empty_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmap.txt");
        std::fs::write(&path, "").unwrap();

        let source = table(3, 2);
        let chosen = Tensor::zeros((0, 2), DType::F32, &Device::Cpu).unwrap();
        let remapper = VocabRemapper::new(Some(path));
        let out = remapper.apply(&chosen, &source, &[]).unwrap();
        assert_eq!(out.dims(), &[0, 2]);
        assert!(remapper.is_loaded());
    }
}
