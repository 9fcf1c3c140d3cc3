//! Running one test in a forked child process.

use crate::failure::TestFailure;
use crate::plugin::PluginChain;
use crate::result::TestResult;
use crate::shell::TestCase;

#[cfg(unix)]
pub(crate) fn run_in_separate_process(
    test: &TestCase,
    plugins: &mut PluginChain,
    result: &mut TestResult,
) {
    use std::io::Write;
    use tracing::debug;

    let _ = std::io::stdout().flush();

    // SAFETY: the child only runs the test on its copy of the address space
    // and leaves through `_exit`, never returning into the caller.
    let pid = unsafe { libc::fork() };

    if pid < 0 {
        let err = std::io::Error::last_os_error();
        result.add_failure(TestFailure::separate_process(
            test.identity(),
            &format!("Call to fork() failed: {err}"),
        ));
        return;
    }

    if pid == 0 {
        test.run_in_current_process(plugins, result);
        let _ = std::io::stdout().flush();
        let code = if result.current_test_failed() { 1 } else { 0 };
        // SAFETY: `_exit` terminates the child immediately.
        unsafe { libc::_exit(code) }
    }

    debug!(pid, test = %test.identity(), "waiting for child");
    wait_for_child(test, pid, result);
}

#[cfg(unix)]
fn wait_for_child(test: &TestCase, pid: libc::pid_t, result: &mut TestResult) {
    use std::io::ErrorKind;
    use tracing::debug;

    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: `status` outlives the call.
        let waited = unsafe { libc::waitpid(pid, &mut status, libc::WUNTRACED) };

        if waited < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            result.add_failure(TestFailure::separate_process(
                test.identity(),
                &format!("Call to waitpid() failed: {err}"),
            ));
            return;
        }

        if libc::WIFEXITED(status) {
            let code = libc::WEXITSTATUS(status);
            debug!(pid, code, "child exited");
            if code != 0 {
                result.add_failure(TestFailure::separate_process(
                    test.identity(),
                    "Failed in separate process",
                ));
            }
            return;
        }

        if libc::WIFSIGNALED(status) {
            let signal = libc::WTERMSIG(status);
            result.add_failure(TestFailure::separate_process(
                test.identity(),
                &format!("Failed in separate process - killed by signal {signal}"),
            ));
            return;
        }

        if libc::WIFSTOPPED(status) {
            result.print("Stopped in separate process - continuing\n");
            // SAFETY: signalling our own child.
            unsafe {
                libc::kill(pid, libc::SIGCONT);
            }
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn run_in_separate_process(
    test: &TestCase,
    _plugins: &mut PluginChain,
    result: &mut TestResult,
) {
    result.add_failure(TestFailure::feature_unsupported(
        test.identity(),
        test.file(),
        test.line(),
        "--separate-process",
    ));
}
