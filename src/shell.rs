//! The restricted-shell emulator.
//!
//! A pure function from a command line to plausible response text, with the
//! single side effect of an internal "exited" flag. It never executes
//! anything; the goal is to keep a scanner typing long enough to record its
//! commands.

use tracing::debug;

const REDIRECTION_REFUSED: &str = "bash: I/O redirection is not allowed";

/// Semi-interactive restricted shell.
#[derive(Debug, Default)]
pub struct RestrictedShell {
    exited: bool,
}

impl RestrictedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a previous `exit` command ended the session.
    pub fn exited(&self) -> bool {
        self.exited
    }

    /// Evaluate one command line and return the response text.
    ///
    /// The line is split on `;` into sub-commands. Sub-commands containing
    /// `>`, `<` or `|` are refused, blank ones are skipped, and the rest are
    /// dispatched on their first whitespace-separated token. Sub-command
    /// outputs are joined with `\n`.
    pub fn exec(&mut self, line: &str) -> String {
        let mut result = Vec::new();

        for sub in line.split(';') {
            if sub.contains('>') || sub.contains('<') || sub.contains('|') {
                result.push(REDIRECTION_REFUSED.to_string());
                continue;
            }

            let mut tokens = sub.split_whitespace();
            let Some(command) = tokens.next() else {
                continue;
            };

            let args: Vec<&str> = tokens.collect();
            debug!(command, ?args, "exec the command");
            result.push(self.run(command, &args));
        }

        result.join("\n")
    }

    fn run(&mut self, command: &str, args: &[&str]) -> String {
        match command {
            "ls" => ".ssh".to_string(),
            "pwd" => "/home/nobody".to_string(),
            "whoami" => "nobody".to_string(),
            "echo" => args.join(" "),
            "exit" => {
                self.exited = true;
                "logout".to_string()
            }
            other => format!("bash: {other}: command not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ls_lists_ssh_dir() {
        assert_eq!(RestrictedShell::new().exec("ls"), ".ssh");
    }

    #[test]
    fn pwd_reports_home() {
        assert_eq!(RestrictedShell::new().exec("pwd"), "/home/nobody");
    }

    #[test]
    fn whoami_reports_nobody() {
        assert_eq!(RestrictedShell::new().exec("whoami"), "nobody");
    }

    #[test]
    fn echo_joins_arguments_with_single_space() {
        assert_eq!(RestrictedShell::new().exec("echo hello   world"), "hello world");
    }

    #[test]
    fn echo_without_arguments_is_empty() {
        assert_eq!(RestrictedShell::new().exec("echo"), "");
    }

    #[test]
    fn unknown_command_not_found() {
        assert_eq!(
            RestrictedShell::new().exec("uname -a"),
            "bash: uname: command not found"
        );
    }

    #[test]
    fn exit_sets_flag_and_logs_out() {
        let mut shell = RestrictedShell::new();
        assert!(!shell.exited());
        assert_eq!(shell.exec("exit"), "logout");
        assert!(shell.exited());
    }

    #[test]
    fn output_redirection_refused() {
        assert_eq!(
            RestrictedShell::new().exec("cat >/tmp/x"),
            REDIRECTION_REFUSED
        );
    }

    #[test]
    fn input_redirection_refused() {
        assert_eq!(
            RestrictedShell::new().exec("wc -l </etc/passwd"),
            REDIRECTION_REFUSED
        );
    }

    #[test]
    fn pipe_refused() {
        assert_eq!(
            RestrictedShell::new().exec("ps aux | grep sshd"),
            REDIRECTION_REFUSED
        );
    }

    #[test]
    fn subcommands_joined_with_newline() {
        let mut shell = RestrictedShell::new();
        assert_eq!(shell.exec("pwd; whoami"), "/home/nobody\nnobody");
    }

    #[test]
    fn blank_subcommands_skipped() {
        let mut shell = RestrictedShell::new();
        assert_eq!(shell.exec("pwd; ; whoami;"), "/home/nobody\nnobody");
    }

    #[test]
    fn refusal_applies_per_subcommand() {
        let mut shell = RestrictedShell::new();
        assert_eq!(
            shell.exec("pwd; cat </etc/shadow"),
            format!("/home/nobody\n{REDIRECTION_REFUSED}")
        );
    }

    #[test]
    fn empty_line_produces_no_output() {
        assert_eq!(RestrictedShell::new().exec(""), "");
        assert_eq!(RestrictedShell::new().exec("   "), "");
    }
}
