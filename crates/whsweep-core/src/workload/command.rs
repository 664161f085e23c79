//! Argument list for one `build` invocation of the workload tool.

use crate::errors::WorkloadError;
use crate::workload::WorkloadVars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadCommand {
    pub threads: u32,
    pub vars: WorkloadVars,
    pub target: Option<String>,
    pub select: Option<String>,
}

impl WorkloadCommand {
    /// `build --fail-fast --threads N --vars JSON [--target T] [--select S]`
    pub fn args(&self) -> Result<Vec<String>, WorkloadError> {
        let vars = serde_json::to_string(&self.vars).map_err(|e| WorkloadError::Launch {
            message: format!("failed to encode vars: {}", e),
        })?;
        let mut args = vec![
            "build".to_string(),
            "--fail-fast".to_string(),
            "--threads".to_string(),
            self.threads.to_string(),
            "--vars".to_string(),
            vars,
        ];
        if let Some(target) = &self.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if let Some(select) = &self.select {
            args.push("--select".to_string());
            args.push(select.clone());
        }
        Ok(args)
    }

    /// Single command line for schedulers that take a string, e.g. `dbt build ...`.
    pub fn command_line(&self, program: &str) -> Result<String, WorkloadError> {
        let mut line = program.to_string();
        for arg in self.args()? {
            line.push(' ');
            line.push_str(&shell_quote(&arg));
        }
        Ok(line)
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/+=@".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> WorkloadCommand {
        WorkloadCommand {
            threads: 16,
            vars: WorkloadVars {
                orchestrator: "whsweep".into(),
                job_name: "PRO".into(),
                job_id: "Small".into(),
                job_run_id: "wh1".into(),
                warehouse_id: "wh1".into(),
                schema: "dl_wh1".into(),
                catalog: "tpcdi".into(),
                scaling_factor: 10,
            },
            target: Some("dynamic".into()),
            select: None,
        }
    }

    #[test]
    fn args_are_fail_fast_with_threads_and_vars() {
        let args = command().args().unwrap();
        assert_eq!(&args[..4], ["build", "--fail-fast", "--threads", "16"]);
        assert_eq!(args[4], "--vars");
        let vars: serde_json::Value = serde_json::from_str(&args[5]).unwrap();
        assert_eq!(vars["job_run_id"], "wh1");
        assert_eq!(vars["scaling_factor"], 10);
        assert_eq!(&args[6..], ["--target", "dynamic"]);
    }

    #[test]
    fn command_line_quotes_json() {
        let line = command().command_line("dbt").unwrap();
        assert!(line.starts_with("dbt build --fail-fast --threads 16 --vars '{"));
        assert!(line.ends_with("}' --target dynamic"));
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
