/// Tunable parameters of the lazy algorithms. The plain entry points (e.g.
/// [`crate::compose::compose_matching`]) use [`Config::default`], the `*_with` variants accept a
/// configuration explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of cache misses after which a [`crate::views::cache`] ages its entries.
    pub cache_max_age: u32,
    /// Maximal age of the caches composition puts around its operands.
    pub compose_cache_max_age: u32,
    /// How many unknown symbols are reported when mapping between alphabets.
    pub report_unknowns: u32,
    /// Upper bound for the passes of the fixed point iteration in
    /// [`crate::sssp::sssp_backward`].
    pub max_fixed_point_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_max_age: 10_000,
            compose_cache_max_age: 10_000,
            report_unknowns: 10,
            max_fixed_point_iterations: 10_000,
        }
    }
}

impl Config {
    /// Sets [`Config::cache_max_age`].
    pub fn with_cache_max_age(mut self, max_age: u32) -> Self {
        self.cache_max_age = max_age;
        self
    }

    /// Sets [`Config::compose_cache_max_age`].
    pub fn with_compose_cache_max_age(mut self, max_age: u32) -> Self {
        self.compose_cache_max_age = max_age;
        self
    }

    /// Sets [`Config::report_unknowns`]. Zero disables reporting.
    pub fn with_report_unknowns(mut self, n: u32) -> Self {
        self.report_unknowns = n;
        self
    }

    /// Sets [`Config::max_fixed_point_iterations`].
    pub fn with_max_fixed_point_iterations(mut self, n: u32) -> Self {
        self.max_fixed_point_iterations = n;
        self
    }
}
