//! Running a built image's CTest suite.
//!
//! Test failures do not fail the run: ctest's exit status is discarded and
//! the `Test.xml` report it leaves under the build prefix is copied to a
//! read-write mount for the caller to inspect.

use std::path::PathBuf;

use wigwam_common::constants::{BUILD_PREFIX, CONTAINER_TEST_DIR, DEFAULT_TEST_OUTPUT_DIR};
use wigwam_common::error::{Result, WigwamError};

/// Default name of the copied report.
pub const DEFAULT_REPORT_NAME: &str = "Test.xml";

/// Options of a ctest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtestOptions {
    /// File name the report is copied to.
    pub report_name: String,
    /// Host directory receiving the report.
    pub output_dir: PathBuf,
    /// Let ctest compress test output.
    pub compress_output: bool,
    /// Do not print the output of failing tests.
    pub quiet_fail: bool,
}

impl Default for CtestOptions {
    fn default() -> Self {
        Self {
            report_name: DEFAULT_REPORT_NAME.into(),
            output_dir: PathBuf::from(DEFAULT_TEST_OUTPUT_DIR),
            compress_output: false,
            quiet_fail: false,
        }
    }
}

impl CtestOptions {
    /// Checks that the report name is a plain file name.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Usage` for empty names, names with a path
    /// separator, and `.`/`..`.
    pub fn validate(&self) -> Result<()> {
        let name = self.report_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(WigwamError::Usage {
                message: format!("report name must be a plain file name, got {name:?}"),
            });
        }
        Ok(())
    }

    /// Returns the shell command run inside the image.
    #[must_use]
    pub fn command(&self) -> String {
        let mut ctest = String::from("ctest");
        if !self.compress_output {
            ctest.push_str(" --no-compress-output");
        }
        if !self.quiet_fail {
            ctest.push_str(" --output-on-failure");
        }
        format!(
            "( {ctest} -T Test || true ) && cp {BUILD_PREFIX}/Testing/*/Test.xml {CONTAINER_TEST_DIR}/{}",
            self.report_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_keeps_output() {
        assert_eq!(
            CtestOptions::default().command(),
            "( ctest --no-compress-output --output-on-failure -T Test || true ) \
             && cp /tmp/build/Testing/*/Test.xml /tmp/Testing/Test.xml"
        );
    }

    #[test]
    fn flags_drop_options() {
        let options = CtestOptions {
            report_name: "nightly.xml".into(),
            compress_output: true,
            quiet_fail: true,
            ..CtestOptions::default()
        };
        assert_eq!(
            options.command(),
            "( ctest -T Test || true ) && cp /tmp/build/Testing/*/Test.xml /tmp/Testing/nightly.xml"
        );
    }

    #[test]
    fn report_name_must_be_plain() {
        for name in ["", ".", "..", "../x.xml", "a/b.xml"] {
            let options = CtestOptions {
                report_name: name.into(),
                ..CtestOptions::default()
            };
            assert!(matches!(options.validate(), Err(WigwamError::Usage { .. })), "{name}");
        }
        assert!(CtestOptions::default().validate().is_ok());
    }
}
