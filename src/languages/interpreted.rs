//! Adapter for languages run straight from source (Python)

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{leak_check, CompileRequest, LanguageAdapter, LanguageConfig};
use crate::context::CheckContext;
use crate::error::CheckError;
use crate::runner::ProcessHandle;

pub struct InterpretedAdapter {
    config: LanguageConfig,
}

impl InterpretedAdapter {
    pub fn new(config: LanguageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LanguageAdapter for InterpretedAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    /// Nothing to build; only checks that there is something to run
    async fn compile(&self, ctx: &CheckContext, request: &CompileRequest) -> Result<(), CheckError> {
        if request.files.is_empty() {
            return Err(anyhow!("compile requires at least one file").into());
        }
        ctx.log(format!(
            "{} is interpreted; skipping compilation of {}",
            self.config.name,
            request.files.join(" ")
        ));
        Ok(())
    }

    fn run_command(&self, program: &str) -> String {
        match &self.config.interpreter {
            Some(interpreter) => format!("{} {}", interpreter, program),
            None => program.to_string(),
        }
    }

    async fn run_with_leak_check(
        &self,
        ctx: &CheckContext,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ProcessHandle, CheckError> {
        leak_check::run(ctx, self.config.leak_checker.as_deref(), command, env).await
    }
}
