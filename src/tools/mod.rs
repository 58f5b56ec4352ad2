//! Running the actions that produce an artifact: external programs, and in-process tasks.

pub mod task;

#[doc(inline)]
pub use task::Task;

use crate::error::BuildError;
use crate::pipeline::Stage;

use color_eyre::eyre::{Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::debug;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// ----------------------------------------------------------------------------
// Invocation
// ----------------------------------------------------------------------------

/// One external program call.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// File the program's standard output is written to.
    pub stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Invocation { program: program.to_string(), args: Vec::new(), stdout: None }
    }

    /// Append an argument.
    pub fn arg<S: ToString>(mut self, arg: S) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Append a path argument.
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.arg(path)
    }

    /// Redirect standard output into a file.
    pub fn stdout<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stdout = Some(path.as_ref().to_path_buf());
        self
    }
}

impl Display for Invocation {
    /// Render the invocation as a shell command line.
    ///
    /// ```rust
    /// use nanometh::tools::Invocation;
    ///
    /// let invocation = Invocation::new("samtools").arg("index").path("/work/pcr.sorted.bam");
    /// assert_eq!(invocation.to_string(), "samtools index /work/pcr.sorted.bam");
    ///
    /// let invocation = Invocation::new("bwa").arg("mem").path("ref.fasta").stdout("pcr.sam");
    /// assert_eq!(invocation.to_string(), "bwa mem ref.fasta > pcr.sam");
    /// ```
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut words = std::iter::once(&self.program).chain(&self.args).join(" ");
        if let Some(stdout) = &self.stdout {
            words = format!("{words} > {}", stdout.display());
        }
        write!(f, "{words}")
    }
}

// ----------------------------------------------------------------------------
// Staging
// ----------------------------------------------------------------------------

/// Maps the published path of an output to the path it is written to while building.
#[derive(Clone, Debug, PartialEq)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Staging { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the staged path of a published output.
    ///
    /// ```rust
    /// use nanometh::tools::Staging;
    /// use std::path::Path;
    ///
    /// let staging = Staging::new("/work/.staging-x1");
    /// assert_eq!(staging.path("/work/ecoli.pcr.sam"), Path::new("/work/.staging-x1/ecoli.pcr.sam"));
    /// ```
    pub fn path<P: AsRef<Path>>(&self, output: P) -> PathBuf {
        self.dir.join(output.as_ref().file_name().unwrap_or_default())
    }
}

// ----------------------------------------------------------------------------
// Job
// ----------------------------------------------------------------------------

/// A single step of a job.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Exec(Invocation),
    Task(Task),
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Exec(invocation) => write!(f, "{invocation}"),
            Action::Task(task) => write!(f, "{}", task.stage()),
        }
    }
}

/// Everything needed to produce one artifact.
///
/// Outputs are the staged paths the actions write to, not the published paths.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    /// Name of the artifact being built.
    pub target: String,
    pub stage: Stage,
    /// Working directory of external programs.
    pub work_dir: PathBuf,
    pub actions: Vec<Action>,
    /// Staged outputs, primary output last.
    pub outputs: Vec<PathBuf>,
}

// ----------------------------------------------------------------------------
// Runner
// ----------------------------------------------------------------------------

/// Runs the actions of a [`Job`].
///
/// Implementations must only return `Ok` once every staged output has been written.
pub trait Runner: Send + Sync {
    fn run(&self, job: &Job) -> Result<(), Report>;
}

/// Runs external programs as child processes, and tasks in-process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToolRunner;

impl ToolRunner {
    fn exec(&self, job: &Job, invocation: &Invocation) -> Result<(), Report> {
        debug!("{}: {invocation}", job.target);
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).current_dir(&job.work_dir).stdin(Stdio::null());

        if let Some(path) = &invocation.stdout {
            let file = File::create(path).wrap_err_with(|| format!("Failed to create output: {path:?}"))?;
            command.stdout(file);
        }

        let status = command
            .status()
            .wrap_err_with(|| format!("Failed to start {} for {}", invocation.program, job.target))
            .suggestion("Check that the program is installed, or set its path in the tools section of the config.")?;

        match status.success() {
            true => Ok(()),
            false => Err(BuildError::ProcessFailed {
                target: job.target.clone(),
                program: invocation.program.clone(),
                status,
            }
            .into()),
        }
    }
}

impl Runner for ToolRunner {
    fn run(&self, job: &Job) -> Result<(), Report> {
        for action in &job.actions {
            match action {
                Action::Exec(invocation) => self.exec(job, invocation)?,
                Action::Task(task) => {
                    debug!("{}: {}", job.target, task.stage());
                    task.run().wrap_err_with(|| format!("Failed to build {}", job.target))?
                }
            }
        }
        Ok(())
    }
}
