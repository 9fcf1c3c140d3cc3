//! The ordered set of tests and the run loop over them.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::filter::TestFilter;
use crate::plugin::{PluginChain, TestPlugin};
use crate::result::TestResult;
use crate::shell::TestCase;

/// Registered tests plus the settings that decide which run and how.
///
/// Tests are added at the front, so a registry filled with `A` then `B`
/// runs `B` first. [`reverse_tests`](Self::reverse_tests) restores
/// declaration order.
#[derive(Debug, Default)]
pub struct TestRegistry {
    tests: VecDeque<TestCase>,
    plugins: PluginChain,
    group_filters: Vec<TestFilter>,
    name_filters: Vec<TestFilter>,
    run_ignored: bool,
    separate_process: bool,
    current_repetition: usize,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every statically registered test.
    pub fn from_registered() -> Self {
        let mut registry = Self::new();
        for test in crate::registration::registered_tests() {
            registry.add_test(test);
        }
        registry
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push_front(test);
    }

    pub fn count_tests(&self) -> usize {
        self.tests.len()
    }

    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter()
    }

    pub fn find_test_with_name(&self, name: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.name() == name)
    }

    pub fn find_test_with_group(&self, group: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.group() == group)
    }

    pub fn set_group_filters(&mut self, filters: Vec<TestFilter>) {
        self.group_filters = filters;
    }

    pub fn set_name_filters(&mut self, filters: Vec<TestFilter>) {
        self.name_filters = filters;
    }

    pub fn group_filters(&self) -> &[TestFilter] {
        &self.group_filters
    }

    pub fn name_filters(&self) -> &[TestFilter] {
        &self.name_filters
    }

    pub fn set_run_ignored(&mut self, run_ignored: bool) {
        self.run_ignored = run_ignored;
    }

    pub fn set_run_tests_in_separate_process(&mut self, separate_process: bool) {
        self.separate_process = separate_process;
    }

    pub fn is_running_tests_in_separate_process(&self) -> bool {
        self.separate_process
    }

    pub fn reverse_tests(&mut self) {
        self.tests.make_contiguous().reverse();
    }

    /// Put the tests in a pseudo-random order determined by `seed`.
    pub fn shuffle_tests(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.tests.make_contiguous().shuffle(&mut rng);
    }

    pub fn install_plugin(&mut self, plugin: Box<dyn TestPlugin>) {
        debug!(plugin = plugin.name(), "installing plugin");
        self.plugins.install(plugin);
    }

    pub fn remove_plugin_by_name(&mut self, name: &str) -> Option<Box<dyn TestPlugin>> {
        debug!(plugin = name, "removing plugin");
        self.plugins.remove_by_name(name)
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn TestPlugin> {
        self.plugins.get(name)
    }

    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginChain {
        &mut self.plugins
    }

    pub fn current_repetition(&self) -> usize {
        self.current_repetition
    }

    /// Unique group names in run order, space separated.
    pub fn list_group_names(&self) -> String {
        let mut groups: Vec<&str> = Vec::new();
        for test in &self.tests {
            if !groups.contains(&test.group()) {
                groups.push(test.group());
            }
        }
        groups.join(" ")
    }

    /// `group.name` for every test the filters accept, space separated.
    pub fn list_group_and_test_names(&self) -> String {
        self.tests
            .iter()
            .filter(|t| t.should_run(&self.group_filters, &self.name_filters))
            .map(|t| format!("{}.{}", t.group(), t.name()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `group.name.file.line`, one line per test the filters accept.
    pub fn list_test_locations(&self) -> String {
        self.tests
            .iter()
            .filter(|t| t.should_run(&self.group_filters, &self.name_filters))
            .map(|t| format!("{}.{}.{}.{}\n", t.group(), t.name(), t.file(), t.line()))
            .collect()
    }

    /// Run every test the filters accept, in the current order.
    ///
    /// Filtered tests touch no counters. Ignored tests are counted but their
    /// phases never run unless run-ignored is set.
    pub fn run_all_tests(&mut self, result: &mut TestResult) {
        self.current_repetition += 1;
        debug!(
            repetition = self.current_repetition,
            tests = self.tests.len(),
            "starting test run"
        );
        let Self {
            tests,
            plugins,
            group_filters,
            name_filters,
            run_ignored,
            separate_process,
            ..
        } = self;

        result.tests_started();
        let mut open_group: Option<String> = None;
        for test in tests.iter() {
            if !test.should_run(group_filters, name_filters) {
                continue;
            }

            if open_group.as_deref() != Some(test.group()) {
                if let Some(group) = open_group.take() {
                    result.current_group_ended(&group);
                }
                result.current_group_started(test.group());
                open_group = Some(test.group().to_string());
            }

            result.count_test();
            result.current_test_started(test.identity());
            let runs = test.will_run(*run_ignored);
            if runs {
                result.count_run();
                test.run_one_test(plugins, result, *separate_process);
            } else {
                result.count_ignored();
            }
            result.current_test_ended(test.identity(), !runs);
        }
        if let Some(group) = open_group {
            result.current_group_ended(&group);
        }
        result.tests_ended();
        debug!(
            failures = result.failure_count(),
            ran = result.run_count(),
            "test run finished"
        );
    }
}

/// Use `seed` when given, otherwise draw one. The seed is always logged so a
/// shuffled run can be repeated.
pub fn resolve_shuffle_seed(seed: Option<u64>) -> u64 {
    let seed = seed.unwrap_or_else(rand::random);
    info!(seed, "shuffling enabled");
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::StringBufferOutput;
    use crate::shell::{Outcome, TestContext};

    fn passing(t: &mut TestContext<'_>) -> Outcome {
        t.check(true, "true")
    }

    fn registry_of(names: &[&str]) -> TestRegistry {
        let mut registry = TestRegistry::new();
        for name in names {
            registry.add_test(TestCase::new("group", *name, passing));
        }
        registry
    }

    #[test]
    fn test_head_insertion_order() {
        let registry = registry_of(&["A", "B"]);
        let names: Vec<&str> = registry.tests().map(|t| t.name()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_reverse_restores_declaration_order() {
        let mut registry = registry_of(&["A", "B", "C"]);
        registry.reverse_tests();
        let names: Vec<&str> = registry.tests().map(|t| t.name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let mut first = registry_of(&["A", "B", "C", "D", "E", "F"]);
        let mut second = registry_of(&["A", "B", "C", "D", "E", "F"]);
        first.shuffle_tests(1234);
        second.shuffle_tests(1234);
        let a: Vec<&str> = first.tests().map(|t| t.name()).collect();
        let b: Vec<&str> = second.tests().map(|t| t.name()).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn test_filtered_tests_touch_no_counters() {
        let mut registry = registry_of(&["A", "B"]);
        registry.set_name_filters(vec![TestFilter::new("A").strict()]);
        let mut result = TestResult::new(StringBufferOutput::new());
        registry.run_all_tests(&mut result);

        assert_eq!(result.test_count(), 1);
        assert_eq!(result.run_count(), 1);
        assert_eq!(result.check_count(), 1);
    }

    #[test]
    fn test_list_names() {
        let mut registry = TestRegistry::new();
        registry.add_test(TestCase::new("g1", "a", passing).at("f.rs", 1));
        registry.add_test(TestCase::new("g2", "b", passing).at("f.rs", 2));
        registry.add_test(TestCase::new("g1", "c", passing).at("f.rs", 3));

        assert_eq!(registry.list_group_names(), "g1 g2");
        assert_eq!(registry.list_group_and_test_names(), "g1.c g2.b g1.a");
        assert_eq!(registry.list_test_locations(), "g1.c.f.rs.3\ng2.b.f.rs.2\ng1.a.f.rs.1\n");
    }
}
