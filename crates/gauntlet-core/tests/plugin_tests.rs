use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use gauntlet_core::plugin::{Overridable, MAX_SET, MEMORY_LEAK_PLUGIN_NAME, SET_POINTER_PLUGIN_NAME};
use gauntlet_core::{
    FailureKind, MemoryLeakPlugin, NullOutput, Outcome, SetPointerPlugin, TestCase, TestContext, TestPlugin,
    TestRegistry, TestResult,
};

/// Allocator slots are process-wide.
static ALLOCATORS: Mutex<()> = Mutex::new(());

fn lock_allocators() -> MutexGuard<'static, ()> {
    ALLOCATORS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn real_port() -> u16 {
    8080
}

fn fake_port() -> u16 {
    1
}

static PORT: Overridable<fn() -> u16> = Overridable::new(real_port);
static RETRIES: Overridable<u32> = Overridable::new(3);

thread_local! {
    static OBSERVED_PORTS: RefCell<Vec<u16>> = const { RefCell::new(Vec::new()) };
}

fn observe_port(_t: &mut TestContext<'_>) -> Outcome {
    OBSERVED_PORTS.with(|ports| ports.borrow_mut().push((PORT.get())()));
    Ok(())
}

fn overrides_port(t: &mut TestContext<'_>) -> Outcome {
    t.set_pointer(&PORT, fake_port)?;
    t.unsigned_longs_equal(1, u64::from((PORT.get())()))
}

fn overrides_too_often(t: &mut TestContext<'_>) -> Outcome {
    for n in 0..=MAX_SET as u32 {
        t.set_pointer(&RETRIES, n)?;
    }
    Ok(())
}

fn leaks(t: &mut TestContext<'_>) -> Outcome {
    let _block = t.malloc(10)?;
    Ok(())
}

fn frees(t: &mut TestContext<'_>) -> Outcome {
    let block = t.malloc(10)?;
    t.free(block);
    Ok(())
}

fn leaks_and_fails(t: &mut TestContext<'_>) -> Outcome {
    let _block = t.malloc(10)?;
    t.fail("broken")
}

#[test]
fn test_overrides_do_not_leak_into_next_test() {
    let mut registry = TestRegistry::new();
    registry.install_plugin(Box::new(SetPointerPlugin::new()));
    registry.add_test(
        TestCase::new("Isolation", "observer", observe_port)
            .with_setup(observe_port)
            .with_teardown(observe_port),
    );
    registry.add_test(TestCase::new("Isolation", "overrider", overrides_port));

    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    assert_eq!(result.failure_count(), 0);
    assert_eq!(OBSERVED_PORTS.with(|ports| ports.borrow().clone()), vec![8080, 8080, 8080]);
    assert_eq!((PORT.get())(), 8080);
}

#[test]
fn test_override_limit_fails_the_test() {
    let mut registry = TestRegistry::new();
    registry.install_plugin(Box::new(SetPointerPlugin::new()));
    registry.add_test(TestCase::new("Isolation", "too_many", overrides_too_often));

    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    assert_eq!(result.failure_count(), 1);
    assert_eq!(
        result.failures()[0].message(),
        "Maximum number of function pointers installed! (limit is 32)"
    );
    assert_eq!(RETRIES.get(), 3);
}

fn leak_registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    registry.install_plugin(Box::new(MemoryLeakPlugin::new()));
    registry
}

#[test]
fn test_leak_fails_the_test() {
    let _guard = lock_allocators();
    let mut registry = leak_registry();
    registry.add_test(TestCase::new("Leaks", "leaks", leaks));
    registry.add_test(TestCase::new("Leaks", "frees", frees));

    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    assert_eq!(result.failure_count(), 1);
    let failure = &result.failures()[0];
    assert_eq!(failure.kind(), FailureKind::MemoryLeak);
    assert_eq!(failure.test().name, "leaks");
    assert!(failure.message().starts_with("Memory leak(s) found.\n"));
    assert!(failure.message().contains("Leak size: 10"));
    assert!(failure.message().contains("Type: \"malloc\""));
    assert!(failure.message().ends_with("Total number of leaks: 1"));
}

#[test]
fn test_leak_in_failed_test_is_not_reported() {
    let _guard = lock_allocators();
    let mut registry = leak_registry();
    registry.add_test(TestCase::new("Leaks", "leaks_and_fails", leaks_and_fails));

    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    assert_eq!(result.failure_count(), 1);
    assert_eq!(result.failures()[0].kind(), FailureKind::Fail);
}

#[test]
fn test_disabled_plugin_finds_no_leaks() {
    let _guard = lock_allocators();
    let mut registry = leak_registry();
    registry.add_test(TestCase::new("Leaks", "leaks", leaks));
    assert!(registry.plugins_mut().set_enabled(MEMORY_LEAK_PLUGIN_NAME, false));

    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);
    assert_eq!(result.failure_count(), 0);

    registry.plugins_mut().set_enabled(MEMORY_LEAK_PLUGIN_NAME, true);
    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);
    assert_eq!(result.failure_count(), 1);
}

struct Counting {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

impl TestPlugin for Counting {
    fn name(&self) -> &str {
        self.name
    }

    fn pre_test_action(&mut self, test: &TestCase, _result: &mut TestResult) {
        self.log.borrow_mut().push(format!("pre:{}:{}", self.name, test.name()));
    }

    fn post_test_action(&mut self, test: &TestCase, _result: &mut TestResult) {
        self.log.borrow_mut().push(format!("post:{}:{}", self.name, test.name()));
    }
}

fn passing(_t: &mut TestContext<'_>) -> Outcome {
    Ok(())
}

#[test]
fn test_plugins_wrap_only_tests_that_run() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = TestRegistry::new();
    registry.install_plugin(Box::new(Counting {
        name: "outer",
        log: log.clone(),
    }));
    registry.install_plugin(Box::new(Counting {
        name: "inner",
        log: log.clone(),
    }));
    registry.add_test(TestCase::new("Plugins", "skipped", passing).ignored());
    registry.add_test(TestCase::new("Plugins", "runs", passing));

    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    assert_eq!(
        *log.borrow(),
        vec!["pre:outer:runs", "pre:inner:runs", "post:outer:runs", "post:inner:runs"]
    );
}

#[test]
fn test_plugin_lookup_and_removal() {
    let mut registry = TestRegistry::new();
    registry.install_plugin(Box::new(SetPointerPlugin::new()));
    registry.install_plugin(Box::new(MemoryLeakPlugin::new()));

    assert_eq!(registry.plugins().names(), vec![SET_POINTER_PLUGIN_NAME, MEMORY_LEAK_PLUGIN_NAME]);
    assert!(registry.plugin(SET_POINTER_PLUGIN_NAME).is_some());

    let removed = registry.remove_plugin_by_name(SET_POINTER_PLUGIN_NAME);
    assert_eq!(removed.map(|p| p.name().to_string()), Some(SET_POINTER_PLUGIN_NAME.to_string()));
    assert!(registry.plugin(SET_POINTER_PLUGIN_NAME).is_none());
    assert!(registry.remove_plugin_by_name("Missing").is_none());
}
