use std::time::Duration;

/// Runtime tuning knobs. Defaults match a strict desktop terminal.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Two clicks closer together than this count as a multi-click.
    pub multi_click_interval: Duration,
    /// Maximum cell distance (Chebyshev) between clicks of one streak:
    /// 0 is strict, 1 is relaxed.
    pub click_distance_threshold: u16,
    /// Base wait before draining more input after one event.
    pub coalesce_initial: Duration,
    /// Upper bound for the adaptive coalescing wait.
    pub coalesce_max: Duration,
    /// Whether input coalescing adapts to output backlog at all.
    pub adaptive_coalescing: bool,
    /// Extra renders allowed per loop iteration when invalidations fire
    /// mid-render.
    pub extra_render_budget: u8,
    /// Substitute a fallback widget for subtrees whose build or render
    /// faults, instead of tearing the session down.
    pub rescue_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            multi_click_interval: Duration::from_millis(500),
            click_distance_threshold: 0,
            coalesce_initial: Duration::from_millis(2),
            coalesce_max: Duration::from_millis(50),
            adaptive_coalescing: true,
            extra_render_budget: 2,
            rescue_enabled: true,
        }
    }
}
