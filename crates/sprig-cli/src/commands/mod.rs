//! Command implementations and dispatch.

use camino::Utf8PathBuf;
use sprig_core::error::{SprigError, SprigResult};
use std::sync::Arc;

pub mod restore;


use crate::output::OutputHandler;
use crate::Commands;

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub output: Arc<OutputHandler>,
}

impl CommandContext {
    pub fn new() -> SprigResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| SprigError::io("Failed to get current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|path| SprigError::InvalidRoot {
            path: path.display().to_string(),
        })?;

        Ok(Self {
            cwd,
            output: Arc::new(OutputHandler::new()),
        })
    }
}

/// Dispatch a command to its handler. `Ok(false)` means the command ran but
/// did not succeed.
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> SprigResult<bool> {
    match command {
        Commands::Restore(args) => {
            let command = restore::RestoreCommand::new(args, ctx.cwd.clone(), ctx.output.clone());
            let succeeded = command.execute().await?;
            if succeeded {
                ctx.output.success("Restore completed");
            }
            Ok(succeeded)
        },
        Commands::Version => {
            show_version(ctx);
            Ok(true)
        },
    }
}

fn show_version(ctx: &CommandContext) {
    let target = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);

    ctx.output.info(&format!("sprig v{}", env!("CARGO_PKG_VERSION")));
    ctx.output.info(&format!("Built: {}", env!("BUILD_DATE")));
    ctx.output.info(&format!("Target: {}", target));
    ctx.output.info(&format!("Rust: {}", env!("RUSTC_VERSION")));
}
