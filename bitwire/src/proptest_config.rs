use proptest::test_runner::Config;

/// Shared configuration for the proptest suites.
///
/// Under Miri, persistence files and the default case count are both
/// unaffordable, so drop to a handful of cases with no FS access.
pub(crate) fn proptest_cfg() -> Config {
    #[cfg(miri)]
    {
        Config {
            failure_persistence: None,
            cases: 4,
            ..Config::default()
        }
    }
    #[cfg(not(miri))]
    {
        Config::default()
    }
}
