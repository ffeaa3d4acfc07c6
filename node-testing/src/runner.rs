// SPDX-License-Identifier: GPL-3.0-only

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use node_sys::{CommandOutcome, CommandRunner, CommandSpec};

#[derive(Debug, Clone)]
struct Script {
    prefix: String,
    success: bool,
    stdout: String,
    stderr: String,
    creates: Vec<PathBuf>,
}

/// Fake command runner.
///
/// Commands are matched against scripted prefixes of their rendered form;
/// the most recently added matching script wins. Unmatched commands succeed
/// with empty output. Nothing is ever executed.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: RefCell<Vec<Script>>,
    commands: RefCell<Vec<CommandSpec>>,
    existing: RefCell<BTreeSet<PathBuf>>,
    pauses: RefCell<Vec<Duration>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, prefix: &str, success: bool, stdout: &str, stderr: &str) -> &Self {
        self.scripts.borrow_mut().push(Script {
            prefix: prefix.to_string(),
            success,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            creates: Vec::new(),
        });
        self
    }

    /// Reply to commands starting with `prefix` with `stdout`.
    pub fn respond(&self, prefix: &str, stdout: &str) -> &Self {
        self.push(prefix, true, stdout, "")
    }

    /// Fail commands starting with `prefix`.
    pub fn fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.push(prefix, false, "", stderr)
    }

    /// Make `path` exist once a command starting with `prefix` has run.
    pub fn creates(&self, prefix: &str, path: impl Into<PathBuf>) -> &Self {
        self.scripts.borrow_mut().push(Script {
            prefix: prefix.to_string(),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            creates: vec![path.into()],
        });
        self
    }

    /// Make `path` exist now.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> &Self {
        self.existing.borrow_mut().insert(path.into());
        self
    }

    /// Rendered command lines in invocation order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().iter().map(CommandSpec::render).collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.commands.borrow().clone()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|command| command.starts_with(prefix))
            .count()
    }

    /// Index of the first command starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.commands()
            .iter()
            .position(|command| command.starts_with(prefix))
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec) -> node_sys::Result<CommandOutcome> {
        let rendered = command.render();
        self.commands.borrow_mut().push(command.clone());

        let scripts = self.scripts.borrow();
        let mut matching = scripts
            .iter()
            .rev()
            .filter(|script| rendered.starts_with(&script.prefix));

        for script in matching.clone() {
            self.existing.borrow_mut().extend(script.creates.iter().cloned());
        }

        let reply = matching.find(|script| script.creates.is_empty());
        Ok(match reply {
            Some(script) => CommandOutcome {
                command: rendered,
                success: script.success,
                stdout: script.stdout.clone(),
                stderr: script.stderr.clone(),
            },
            None => CommandOutcome {
                command: rendered,
                success: true,
                ..Default::default()
            },
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.existing.borrow().contains(path)
    }

    fn pause(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_matching_script_wins() {
        let runner = ScriptedRunner::new();
        runner.respond("vgs", "HostVG\n").fail("vgs --noheadings", "locked");

        let outcome = runner
            .run(&CommandSpec::new("vgs").args(["--noheadings", "-o", "vg_name"]))
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.stderr, "locked");
        assert!(runner.succeeds(&CommandSpec::new("pvs")));
        assert_eq!(runner.count("vgs"), 1);
    }

    #[test]
    fn commands_can_create_paths() {
        let runner = ScriptedRunner::new();
        runner.creates("parted /dev/sdb", "/dev/sdb1");

        assert!(!runner.exists(Path::new("/dev/sdb1")));
        runner
            .check(&CommandSpec::new("parted").args(["/dev/sdb", "-s", "mklabel gpt"]))
            .unwrap();
        assert!(runner.exists(Path::new("/dev/sdb1")));
    }

    #[test]
    fn records_pauses_instead_of_sleeping() {
        let runner = ScriptedRunner::new();
        runner.pause(Duration::from_secs(5));
        assert_eq!(runner.pauses(), vec![Duration::from_secs(5)]);
    }
}
