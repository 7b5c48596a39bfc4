use sirocco_definition::RetryPolicy;

/// Tunables shared by every execution the engine drives.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Upper bound on concurrent Map iterations; a state's own
  /// `MaxConcurrency` may lower but never raise it.
  pub max_map_concurrency: usize,

  /// Maximum nesting depth of Parallel/Map states.
  pub max_branch_depth: usize,

  /// Retry policy applied to Task states that declare none. `None`
  /// means undeclared tasks get a single attempt.
  pub default_retry: Option<RetryPolicy>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_map_concurrency: 16,
      max_branch_depth: 8,
      default_retry: None,
    }
  }
}
