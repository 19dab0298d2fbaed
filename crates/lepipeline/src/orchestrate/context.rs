use crate::polling::PollingPolicy;

/// Runtime configuration for pipeline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineContext {
    /// Interval and budget for watching the video job.
    pub polling: PollingPolicy,
}

impl PipelineContext {
    /// Create a context with the given polling policy.
    pub fn new(polling: PollingPolicy) -> Self {
        Self { polling }
    }
}
