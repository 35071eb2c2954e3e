use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// The default directory holding the datapath programs and their makefile.
pub const BPF_DIR: &str = "/app/bpf";

/// Attaches and unloads the kernel fast-path programs.
#[async_trait::async_trait]
pub trait Datapath: Send + Sync + 'static {
    async fn attach(&self) -> Result<()>;

    async fn unload(&self) -> Result<()>;
}

/// Drives the datapath through its makefile's `attach` and `clean` targets.
#[derive(Clone, Debug)]
pub struct MakeDatapath {
    dir: PathBuf,
}

// === impl MakeDatapath ===

impl MakeDatapath {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn make(&self, target: &str) -> Result<()> {
        debug!(dir = %self.dir.display(), %target, "Running make");
        let output = Command::new("make")
            .arg("-C")
            .arg(&self.dir)
            .arg(target)
            .output()
            .await
            .with_context(|| format!("failed to run make {target}"))?;
        if !output.status.success() {
            bail!(
                "make {target} failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Datapath for MakeDatapath {
    async fn attach(&self) -> Result<()> {
        self.make("attach").await?;
        info!("Attached datapath programs");
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.make("clean").await?;
        info!("Unloaded datapath programs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_fails() {
        let datapath = MakeDatapath::new("/nonexistent/bpf");
        assert!(datapath.attach().await.is_err());
        assert!(datapath.unload().await.is_err());
    }
}
