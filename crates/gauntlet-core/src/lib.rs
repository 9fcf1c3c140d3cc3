pub mod config;
pub mod failure;
pub mod filter;
pub mod memory;
pub mod mock;
pub mod output;
pub mod plugin;
pub mod registration;
pub mod registry;
pub mod result;
pub mod shell;

#[doc(hidden)]
pub use inventory;

pub use config::{Config, ConfigError, OutputFormat};
pub use failure::{FailureKind, TestFailure};
pub use filter::TestFilter;
pub use memory::{AllocationKind, MemoryBlock, MemoryError, TestMemoryAllocator};
pub use mock::{mock, mock_scope, MockSupportPlugin};
pub use output::{NullOutput, StringBufferOutput, TestOutput};
pub use plugin::{MemoryLeakPlugin, PluginChain, SetPointerPlugin, TestPlugin};
pub use registry::{resolve_shuffle_seed, TestRegistry};
pub use result::{RunSummary, TestRecord, TestResult};
pub use shell::{Abort, Outcome, TestCase, TestContext, TestFn, TestIdentity, TestKind, Utest};
