use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Picks the drawtext font from an ordered list of well-known locations.
#[derive(Debug, Clone)]
pub struct FontLocator {
    candidates: Vec<PathBuf>,
}

impl FontLocator {
    pub fn new<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn locate(&self) -> Option<PathBuf> {
        self.locate_with(Path::is_file)
    }

    pub fn locate_with<F>(&self, exists: F) -> Option<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let found = self
            .candidates
            .iter()
            .find(|candidate| exists(candidate.as_path()))
            .cloned();
        match &found {
            Some(path) => debug!(font = %path.display(), "using drawtext font"),
            None => warn!(
                candidates = self.candidates.len(),
                "no font candidate found, falling back to ffmpeg default font"
            ),
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_candidate_wins() {
        let locator = FontLocator::new(["/a.ttf", "/b.ttf", "/c.ttf"]);
        let found = locator.locate_with(|path| path != Path::new("/a.ttf"));
        assert_eq!(found, Some(PathBuf::from("/b.ttf")));
    }

    #[test]
    fn none_when_nothing_exists() {
        let locator = FontLocator::new(["/a.ttf"]);
        assert!(locator.locate_with(|_| false).is_none());
    }

    #[test]
    fn locate_checks_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("Sans.ttf");
        std::fs::write(&font, b"font").unwrap();
        let locator = FontLocator::new([dir.path().join("missing.ttf"), font.clone()]);
        assert_eq!(locator.locate(), Some(font));
    }
}
