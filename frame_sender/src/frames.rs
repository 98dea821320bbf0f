//! Frames read from image files.
//!
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

/// A single encoded image ready to be sent.
pub struct Frame {
    pub name: String,
    pub data: Vec<u8>,
}

/// Yields the contents of a list of image files in order, optionally starting over at the end.
pub struct FrameSource {
    paths: Vec<PathBuf>,
    repeat: bool,
    next: usize,
}

impl FrameSource {
    pub fn new(paths: Vec<PathBuf>, repeat: bool) -> Self {
        Self {
            paths,
            repeat,
            next: 0,
        }
    }

    /// Read the next frame, `None` once all files were sent and `repeat` is off.
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        if self.next >= self.paths.len() {
            if !self.repeat || self.paths.is_empty() {
                return None;
            }
            self.next = 0;
        }

        let path = &self.paths[self.next];
        self.next += 1;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".into());
        let frame = fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))
            .map(|data| Frame { name, data });

        Some(frame)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_frames(tag: &str) -> Result<Vec<PathBuf>> {
        let dir = std::env::temp_dir().join(format!("frames-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir)?;

        let mut paths = vec![];
        for (name, content) in [("a.png", b"aaa"), ("b.png", b"bbb")] {
            let path = dir.join(name);
            fs::write(&path, content)?;
            paths.push(path);
        }

        Ok(paths)
    }

    #[test]
    fn test_frames_in_order() -> Result<()> {
        let mut source = FrameSource::new(write_frames("once")?, false);

        let first = source.next_frame().unwrap()?;
        assert_eq!(first.name, "a.png");
        assert_eq!(first.data, b"aaa");
        assert_eq!(source.next_frame().unwrap()?.name, "b.png");
        assert!(source.next_frame().is_none());

        Ok(())
    }

    #[test]
    fn test_frames_repeat() -> Result<()> {
        let mut source = FrameSource::new(write_frames("repeat")?, true);

        let names = (0..5)
            .map(|_| source.next_frame().unwrap().map(|frame| frame.name))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(names, ["a.png", "b.png", "a.png", "b.png", "a.png"]);

        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let mut source = FrameSource::new(vec![PathBuf::from("no/such/frame.jpg")], true);

        assert!(source.next_frame().unwrap().is_err());
        assert!(FrameSource::new(vec![], true).next_frame().is_none());
    }
}
