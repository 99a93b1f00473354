/// Bar colors used by the front end: decoding, failed, done
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BarColor {
    #[default]
    CYAN,
    RED,
    GREEN,
}

/// Progress report of a worker on one data file
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub file_number: usize,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, file_number: usize, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            file_number,
            worker_id,
            color,
        }
    }
}
