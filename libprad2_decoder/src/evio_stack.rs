use super::error::{EvioFileError, EvioStackError};
use super::evio_file::EvioFile;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// The split number of `file_name` if it is `base` or `base.N`
fn split_number(file_name: &str, base: &str) -> Option<u64> {
    if file_name == base {
        return Some(0);
    }
    file_name
        .strip_prefix(base)?
        .strip_prefix('.')?
        .parse::<u64>()
        .ok()
}

/// The stack of files making up one CODA run.
///
/// CODA splits the output of a run into `<name>.evio.0`, `<name>.evio.1`, ... The
/// stack reads them in split order as one stream of events. A path naming a single
/// split file gives a stack of just that file.
#[derive(Debug)]
pub struct EvioStack {
    pub file_stack: VecDeque<PathBuf>,
    active_file: EvioFile,
    pub total_stack_size_bytes: u64,
    is_ended: bool,
}

impl EvioStack {
    /// Create a new EvioStack for a run's base path (`<dir>/<name>.evio`)
    pub fn new(path: &Path) -> Result<Self, EvioStackError> {
        let (mut stack, bytes) = Self::get_file_stack(path)?;
        if let Some(file_path) = stack.pop_front() {
            Ok(EvioStack {
                file_stack: stack,
                active_file: EvioFile::new(&file_path)?,
                total_stack_size_bytes: bytes,
                is_ended: false,
            })
        } else {
            Err(EvioStackError::NoMatchingFiles(path.to_path_buf()))
        }
    }

    /// Read the next event in the stack into `buffer`
    ///
    /// Returns `Ok(false)` once the stack has no more data.
    pub fn read_event(&mut self, buffer: &mut Vec<u32>) -> Result<bool, EvioStackError> {
        loop {
            if self.is_ended {
                return Ok(false);
            }

            match self.active_file.read_event(buffer) {
                Ok(()) => return Ok(true),
                Err(EvioFileError::EndOfFile) => {
                    self.move_to_next_file()?;
                }
                Err(e) => return Err(EvioStackError::FileError(e)),
            };
        }
    }

    /// Get all of the split files of the run and put them in the stack
    fn get_file_stack(path: &Path) -> Result<(VecDeque<PathBuf>, u64), EvioStackError> {
        if path.is_file() && path.extension().is_some_and(|ext| ext.to_str() != Some("evio")) {
            let bytes = path.metadata()?.len();
            return Ok((VecDeque::from([path.to_path_buf()]), bytes));
        }

        let parent_path = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return Err(EvioStackError::NoMatchingFiles(path.to_path_buf())),
        };

        let mut file_list: Vec<(u64, PathBuf)> = Vec::new();
        for item in parent_path.read_dir()? {
            let item_path = item?.path();
            let Some(name) = item_path.file_name().map(|n| n.to_string_lossy().to_string())
            else {
                continue;
            };
            if let Some(number) = split_number(&name, &base) {
                file_list.push((number, item_path));
            }
        }

        if file_list.is_empty() {
            return Err(EvioStackError::NoMatchingFiles(path.to_path_buf()));
        }

        let mut total_stack_size_bytes = 0;
        for (_, file_path) in file_list.iter() {
            total_stack_size_bytes += file_path.metadata()?.len();
        }

        // split numbers sort numerically, so .10 follows .9
        file_list.sort();
        let stack = file_list.into_iter().map(|(_, path)| path).collect();

        Ok((stack, total_stack_size_bytes))
    }

    /// Move to the next file in the stack
    fn move_to_next_file(&mut self) -> Result<(), EvioStackError> {
        loop {
            if let Some(next_file_path) = self.file_stack.pop_front() {
                let next_file = EvioFile::new(&next_file_path)?;
                if !next_file.is_eof() {
                    log::info!(
                        "Moving to evio file {} ({})",
                        next_file_path.to_string_lossy(),
                        human_bytes::human_bytes(next_file.get_size_bytes() as f64)
                    );
                    self.active_file = next_file;
                    return Ok(());
                }
            } else {
                self.is_ended = true;
                return Ok(());
            }
        }
    }
}
