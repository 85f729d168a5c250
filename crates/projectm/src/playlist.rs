use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::prelude::*;

use crate::engine::EngineError;

/// File extensions recognised as presets.
pub const PRESET_EXTENSIONS: [&str; 2] = ["milk", "prjm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistMode {
    Sequential,
    Shuffle,
}

/// Preset rotation driven by rendered time.
#[derive(Debug)]
pub struct Playlist {
    items: Vec<PathBuf>,
    mode: PlaylistMode,
    /// Zero keeps the current preset forever.
    item_duration: Duration,
    order: Vec<usize>,
    cursor: usize,
    elapsed: Duration,
    rng: StdRng,
}

/// Preset files directly inside `dir`, sorted by path.
pub fn scan_presets(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let scan_error = |source| EngineError::PresetDirectory {
        path: dir.to_path_buf(),
        source,
    };
    let mut presets = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_error)? {
        let path = entry.map_err(scan_error)?.path();
        let is_preset = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                PRESET_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            });
        if is_preset && path.is_file() {
            presets.push(path);
        }
    }
    presets.sort();
    Ok(presets)
}

impl Playlist {
    pub fn new(items: Vec<PathBuf>, mode: PlaylistMode, item_duration: Duration, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let order = build_order(items.len(), mode, &mut rng);
        Self {
            items,
            mode,
            item_duration,
            order,
            cursor: 0,
            elapsed: Duration::ZERO,
            rng,
        }
    }

    pub fn from_directory(
        dir: &Path,
        mode: PlaylistMode,
        item_duration: Duration,
        seed: u64,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(scan_presets(dir)?, mode, item_duration, seed))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn mode(&self) -> PlaylistMode {
        self.mode
    }

    pub fn current(&self) -> Option<&Path> {
        let index = *self.order.get(self.cursor)?;
        self.items.get(index).map(PathBuf::as_path)
    }

    /// Moves to the next preset, reshuffling after a full pass.
    pub fn advance(&mut self) -> Option<&Path> {
        self.elapsed = Duration::ZERO;
        if self.items.len() > 1 {
            self.cursor += 1;
            if self.cursor >= self.order.len() {
                self.order = build_order(self.items.len(), self.mode, &mut self.rng);
                self.cursor = 0;
            }
        }
        self.current()
    }

    /// Accounts for `dt` of rendered time; returns the new preset when the
    /// current one has expired. Nothing expires while `locked`.
    pub fn tick(&mut self, dt: Duration, locked: bool) -> Option<&Path> {
        if locked || self.items.len() <= 1 || self.item_duration.is_zero() {
            return None;
        }
        self.elapsed += dt;
        if self.elapsed < self.item_duration {
            return None;
        }
        self.advance()
    }
}

fn build_order(len: usize, mode: PlaylistMode, rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    match mode {
        PlaylistMode::Sequential => {}
        PlaylistMode::Shuffle => {
            order.shuffle(rng);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn sequential_advances_after_duration() {
        let mut playlist = Playlist::new(
            items(&["a.milk", "b.milk"]),
            PlaylistMode::Sequential,
            Duration::from_millis(100),
            1,
        );
        assert_eq!(playlist.current(), Some(Path::new("a.milk")));
        assert_eq!(playlist.tick(Duration::from_millis(60), false), None);
        assert_eq!(
            playlist.tick(Duration::from_millis(60), false),
            Some(Path::new("b.milk"))
        );
        assert_eq!(
            playlist.tick(Duration::from_millis(100), false),
            Some(Path::new("a.milk"))
        );
    }

    #[test]
    fn locked_or_indefinite_never_advances() {
        let mut locked = Playlist::new(
            items(&["a.milk", "b.milk"]),
            PlaylistMode::Sequential,
            Duration::from_secs(1),
            1,
        );
        assert_eq!(locked.tick(Duration::from_secs(5), true), None);
        assert_eq!(locked.current(), Some(Path::new("a.milk")));

        let mut indefinite = Playlist::new(
            items(&["a.milk", "b.milk"]),
            PlaylistMode::Sequential,
            Duration::ZERO,
            1,
        );
        assert_eq!(indefinite.tick(Duration::from_secs(5), false), None);
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let names: Vec<String> = (0..12).map(|i| format!("{i:02}.milk")).collect();
        let paths: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
        let run = |seed| {
            let mut playlist =
                Playlist::new(paths.clone(), PlaylistMode::Shuffle, Duration::from_secs(1), seed);
            let mut seen = vec![playlist.current().unwrap().to_path_buf()];
            for _ in 1..paths.len() {
                seen.push(playlist.advance().unwrap().to_path_buf());
            }
            seen
        };
        let first = run(42);
        assert_eq!(first, run(42));

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, paths);
    }

    #[test]
    fn empty_playlist_has_no_current() {
        let mut playlist =
            Playlist::new(Vec::new(), PlaylistMode::Shuffle, Duration::from_secs(1), 0);
        assert!(playlist.is_empty());
        assert_eq!(playlist.current(), None);
        assert_eq!(playlist.advance(), None);
    }

    #[test]
    fn scans_only_presets_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.milk", "a.prjm", "notes.txt", "C.MILK"] {
            fs::write(dir.path().join(name), "[preset00]\n").unwrap();
        }
        fs::create_dir(dir.path().join("nested.milk")).unwrap();

        let found: Vec<String> = scan_presets(dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, ["C.MILK", "a.prjm", "b.milk"]);

        assert!(matches!(
            scan_presets(&dir.path().join("missing")),
            Err(EngineError::PresetDirectory { .. })
        ));
    }
}
