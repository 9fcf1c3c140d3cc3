//! Drives a registry through the configured number of runs.

use color_eyre::Result;
use gauntlet_core::memory::GlobalMemoryAccountant;
use gauntlet_core::{
    resolve_shuffle_seed, shell, Config, MemoryLeakPlugin, MockSupportPlugin, SetPointerPlugin, TestOutput,
    TestRegistry, TestResult,
};
use tracing::{debug, info};

use crate::args::ListMode;
use crate::output::make_output;

/// Runs a registry according to a [`Config`].
pub struct Runner {
    config: Config,
    list_mode: Option<ListMode>,
}

/// What a sequence of runs added up to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub failures: usize,
    pub failed_runs: usize,
    pub shuffle_seed: Option<u64>,
}

impl RunOutcome {
    /// Process exit code: the failure count, else the number of failed runs.
    pub fn exit_code(&self) -> i32 {
        let code = if self.failures > 0 {
            self.failures
        } else {
            self.failed_runs
        };
        i32::try_from(code).unwrap_or(i32::MAX)
    }
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            list_mode: None,
        }
    }

    pub fn with_list_mode(mut self, list_mode: Option<ListMode>) -> Self {
        self.list_mode = list_mode;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply filters and run settings to `registry` and install the plugins.
    pub fn prepare(&self, registry: &mut TestRegistry) {
        registry.set_group_filters(self.config.filter.group_filters());
        registry.set_name_filters(self.config.filter.name_filters());
        registry.set_run_ignored(self.config.run.run_ignored);
        registry.set_run_tests_in_separate_process(self.config.run.separate_process);
        if self.config.run.reverse {
            registry.reverse_tests();
        }

        registry.install_plugin(Box::new(SetPointerPlugin::new()));
        registry.install_plugin(Box::new(MockSupportPlugin::new()));
        if self.config.memory.detect_leaks {
            registry.install_plugin(Box::new(MemoryLeakPlugin::new()));
        }
    }

    /// Print the requested listing, or run the tests and print the results.
    pub fn run(&self, registry: &mut TestRegistry) -> Result<RunOutcome> {
        self.prepare(registry);

        if let Some(mode) = self.list_mode {
            let listing = match mode {
                ListMode::Groups => registry.list_group_names(),
                ListMode::Names => registry.list_group_and_test_names(),
                ListMode::Locations => registry.list_test_locations(),
            };
            print!("{listing}");
            if mode != ListMode::Locations {
                println!();
            }
            return Ok(RunOutcome::default());
        }

        shell::set_crash_on_fail(self.config.run.crash_on_fail);
        shell::set_rethrow_panics(self.config.run.rethrow_panics);
        shell::install_panic_hook();

        let mut accountant = if self.config.memory.accountant {
            let mut accountant = GlobalMemoryAccountant::new();
            accountant.use_cache_sizes(&self.config.memory.cache_sizes)?;
            accountant.start()?;
            Some(accountant)
        } else {
            None
        };

        let outcome = self.run_repeatedly(registry, || make_output(&self.config.output));

        if let Some(accountant) = accountant.as_mut() {
            accountant.stop()?;
            print!("{}", accountant.report());
        }
        Ok(outcome)
    }

    /// The repeat and shuffle loop, with a fresh output per run.
    pub fn run_repeatedly<F>(&self, registry: &mut TestRegistry, mut output: F) -> RunOutcome
    where
        F: FnMut() -> Box<dyn TestOutput>,
    {
        let mut outcome = RunOutcome::default();
        if self.config.run.shuffle {
            let seed = resolve_shuffle_seed(self.config.run.shuffle_seed);
            if self.config.output.format == gauntlet_core::OutputFormat::Console {
                println!("shuffling enabled with seed: {seed}");
            }
            outcome.shuffle_seed = Some(seed);
        }

        let repeat = self.config.run.repeat.max(1);
        for repetition in 0..repeat {
            if let Some(seed) = outcome.shuffle_seed {
                registry.shuffle_tests(seed.wrapping_add(repetition as u64));
            }

            let mut result = TestResult::with_output(output());
            result.test_run_started(repetition + 1, repeat);
            registry.run_all_tests(&mut result);

            outcome.failures += result.failure_count();
            if result.is_failure() {
                outcome.failed_runs += 1;
            }
            debug!(
                repetition = repetition + 1,
                failures = result.failure_count(),
                "run complete"
            );
        }
        info!(
            failures = outcome.failures,
            failed_runs = outcome.failed_runs,
            "all runs complete"
        );
        outcome
    }
}
