//! Slurm batch scripts and their submission command

use std::fmt::Write as _;

use rand::Rng;
use serde::{Deserialize, Serialize};

use hl_core::shell::{heredoc_delimiter, quote};
use hl_core::time::current_time_millis;

/// A batch job: `#SBATCH` directives, module loads and a shell body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub name: String,
    pub partition: String,
    pub nodes: u32,
    #[serde(default)]
    pub ntasks_per_node: Option<u32>,
    pub cpus: u32,
    pub memory: String,
    pub time: String,
    #[serde(default)]
    pub gres: Option<String>,
    /// stdout file pattern, e.g. `job_%j.out`
    #[serde(default)]
    pub output: Option<String>,
    /// stderr file pattern
    #[serde(default)]
    pub error: Option<String>,
    /// Environment modules loaded before the body runs
    #[serde(default)]
    pub modules: Vec<String>,
    pub body: String,
}

impl BatchJob {
    /// General-purpose CPU job: one core, 1G, one hour on `kamiak`
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: "kamiak".into(),
            nodes: 1,
            ntasks_per_node: None,
            cpus: 1,
            memory: "1G".into(),
            time: "01:00:00".into(),
            gres: None,
            output: Some("job_%j.out".into()),
            error: Some("job_%j.err".into()),
            modules: Vec::new(),
            body: [
                "echo \"======================================================\"",
                "echo \"Starting job on $(hostname)\"",
                "echo \"Job ID: $SLURM_JOB_ID\"",
                "echo \"======================================================\"",
                "",
                "echo \"Hello Kamiak\"",
            ]
            .join("\n"),
        }
    }

    /// Single-GPU job on the `gpu` partition
    pub fn gpu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: "gpu".into(),
            nodes: 1,
            ntasks_per_node: None,
            cpus: 2,
            memory: "32G".into(),
            time: "04:00:00".into(),
            gres: Some("gpu:1".into()),
            output: Some("gpu_job_%j.out".into()),
            error: Some("gpu_job_%j.err".into()),
            modules: vec!["cuda/12.2.0".into()],
            body: "echo \"Starting GPU job...\"\nnvidia-smi".into(),
        }
    }

    /// Replace the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Render the full script
    pub fn render(&self) -> String {
        let mut script = String::from("#!/bin/bash\n");
        let mut directive = |key: &str, value: &dyn std::fmt::Display| {
            let _ = writeln!(script, "#SBATCH --{}={}", key, value);
        };
        directive("job-name", &self.name);
        directive("partition", &self.partition);
        directive("nodes", &self.nodes);
        if let Some(n) = self.ntasks_per_node {
            directive("ntasks-per-node", &n);
        }
        directive("cpus-per-task", &self.cpus);
        directive("mem", &self.memory);
        if let Some(gres) = &self.gres {
            directive("gres", gres);
        }
        directive("time", &self.time);
        if let Some(output) = &self.output {
            directive("output", output);
        }
        if let Some(error) = &self.error {
            directive("error", error);
        }

        if !self.modules.is_empty() {
            script.push('\n');
            for module in &self.modules {
                let _ = writeln!(script, "module load {}", module);
            }
        }

        script.push('\n');
        script.push_str(self.body.trim_end());
        script.push('\n');
        script
    }
}

/// Remote file name unique across concurrent submissions:
/// `<prefix>_<millis>_<random>.slurm`
pub fn unique_script_name(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}_{}_{:08x}.slurm", prefix, current_time_millis(), suffix)
}

/// Command that writes `script` to `file`, submits it, and removes the file
/// whatever sbatch did. The command exits with sbatch's status.
pub fn submission_command(file: &str, script: &str) -> String {
    let delimiter = heredoc_delimiter(script, "HPC_LINK_EOF");
    let file = quote(file);
    format!(
        "cat << '{delim}' > {file}\n{script}\n{delim}\nsbatch {file}; rc=$?; rm -f {file}; exit $rc\n",
        delim = delimiter,
        file = file,
        script = script.trim_end_matches('\n'),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_render() {
        let script = BatchJob::standard("my-job").render();
        assert!(script.starts_with("#!/bin/bash\n#SBATCH --job-name=my-job\n"));
        assert!(script.contains("#SBATCH --partition=kamiak\n"));
        assert!(script.contains("#SBATCH --cpus-per-task=1\n"));
        assert!(script.contains("#SBATCH --mem=1G\n"));
        assert!(script.contains("#SBATCH --time=01:00:00\n"));
        assert!(script.contains("#SBATCH --output=job_%j.out\n"));
        assert!(!script.contains("--gres"));
        assert!(!script.contains("module load"));
        assert!(script.ends_with("echo \"Hello Kamiak\"\n"));
    }

    #[test]
    fn test_gpu_render_loads_modules_before_body() {
        let script = BatchJob::gpu("train").render();
        assert!(script.contains("#SBATCH --gres=gpu:1\n"));
        assert!(script.contains("#SBATCH --partition=gpu\n"));
        let module = script.find("module load cuda/12.2.0").unwrap();
        let body = script.find("nvidia-smi").unwrap();
        let last_directive = script.rfind("#SBATCH").unwrap();
        assert!(last_directive < module && module < body);
    }

    #[test]
    fn test_unique_names_differ() {
        let a = unique_script_name("llm_job");
        let b = unique_script_name("llm_job");
        assert!(a.starts_with("llm_job_") && a.ends_with(".slurm"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_submission_removes_file_and_keeps_status() {
        let cmd = submission_command("job_1_ab.slurm", "#!/bin/bash\necho hi\n");
        assert_eq!(
            cmd,
            "cat << 'HPC_LINK_EOF' > job_1_ab.slurm\n#!/bin/bash\necho hi\nHPC_LINK_EOF\n\
             sbatch job_1_ab.slurm; rc=$?; rm -f job_1_ab.slurm; exit $rc\n"
        );
    }

    #[test]
    fn test_submission_avoids_delimiter_collision() {
        let cmd = submission_command("f.slurm", "echo a\nHPC_LINK_EOF\necho b");
        assert!(cmd.starts_with("cat << 'HPC_LINK_EOF_1' > f.slurm\n"));
        assert!(cmd.contains("\nHPC_LINK_EOF_1\nsbatch"));
    }
}
