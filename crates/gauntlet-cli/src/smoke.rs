//! Self-checks shipped with the runner binary.

use gauntlet_core::mock::mock;
use gauntlet_core::plugin::Overridable;
use gauntlet_core::{check, test_case, Outcome, TestContext};

fn system_clock() -> u64 {
    0
}

fn frozen_clock() -> u64 {
    1_000
}

static CLOCK: Overridable<fn() -> u64> = Overridable::new(system_clock);

fn elapsed_since(start: u64) -> u64 {
    (CLOCK.get())().saturating_sub(start)
}

fn assertions_pass(t: &mut TestContext<'_>) -> Outcome {
    check!(t, 1 + 1 == 2)?;
    t.longs_equal(-4, -2 * 2)?;
    t.strcmp_equal("gauntlet", &"GAUNTLET".to_lowercase())?;
    t.doubles_equal(0.1 + 0.2, 0.3, 1e-9)?;
    t.bits_equal(0x0f, 0xff, 0x0f, 1)
}

fn mock_call_is_verified(t: &mut TestContext<'_>) -> Outcome {
    mock().expect_one_call("read").with_parameter("fd", 3).and_return_value(42);
    let value = mock().actual_call("read").with_parameter("fd", 3).return_int_value();
    t.longs_equal(42, value.into())
}

fn clock_override_is_scoped(t: &mut TestContext<'_>) -> Outcome {
    t.set_pointer(&CLOCK, frozen_clock)?;
    t.unsigned_longs_equal(900, elapsed_since(100))
}

fn memory_is_returned(t: &mut TestContext<'_>) -> Outcome {
    let mut block = t.malloc(8)?;
    block.as_mut_slice().fill(0xab);
    t.memcmp_equal(&[0xab; 8], block.as_slice())?;
    t.free(block);
    Ok(())
}

test_case!(Smoke, assertions_pass, assertions_pass);
test_case!(Smoke, mock_call_is_verified, mock_call_is_verified);
test_case!(Smoke, clock_override_is_scoped, clock_override_is_scoped);
test_case!(Smoke, memory_is_returned, memory_is_returned);
