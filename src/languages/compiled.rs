//! Adapter for languages built ahead of time (C, C++)

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::{leak_check, CompileRequest, LanguageAdapter, LanguageConfig};
use crate::context::CheckContext;
use crate::core::utils::truncate_lines;
use crate::error::CheckError;
use crate::runner::ProcessHandle;

pub struct CompiledAdapter {
    config: LanguageConfig,
}

impl CompiledAdapter {
    pub fn new(config: LanguageConfig) -> Self {
        Self { config }
    }

    /// Full compiler command line for `request`
    pub fn compile_command(&self, request: &CompileRequest) -> Result<String, CheckError> {
        let first = request
            .files
            .first()
            .ok_or_else(|| anyhow!("compile requires at least one file"))?;
        let compiler = self
            .config
            .compiler
            .as_deref()
            .ok_or_else(|| anyhow!("{} has no compiler configured", self.config.name))?;

        let output = request.output.clone().or_else(|| {
            let path = Path::new(first);
            let is_source = path
                .extension()
                .is_some_and(|ext| ext == self.config.source_extension.as_str());
            is_source
                .then(|| path.file_stem())
                .flatten()
                .map(|stem| stem.to_string_lossy().into_owned())
        });

        let mut parts = vec![compiler.to_string()];
        parts.extend(request.files.iter().cloned());
        if let Some(output) = output {
            parts.push("-o".to_string());
            parts.push(output);
        }
        parts.extend(self.config.default_flags.merged(&request.flags).render());
        Ok(parts.join(" "))
    }
}

#[async_trait]
impl LanguageAdapter for CompiledAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn compile(&self, ctx: &CheckContext, request: &CompileRequest) -> Result<(), CheckError> {
        let command = self.compile_command(request)?;
        debug!("Compiling {:?} with `{}`", request.files, command);

        let mut process = ctx
            .run(&command)
            .await?
            .timeout(ctx.config().compile_timeout());
        let output = process.output().await?;
        let status = process.wait().await?;

        if !status.success() {
            for line in truncate_lines(&output, ctx.config().max_log_lines) {
                ctx.log(line);
            }
            return Err(CheckError::failure("code failed to compile"));
        }
        Ok(())
    }

    fn run_command(&self, program: &str) -> String {
        if program.contains('/') {
            program.to_string()
        } else {
            format!("./{}", program)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::languages::{CompileFlags, FlagValue, LanguageKind};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn language(compiler: &str) -> LanguageConfig {
        let mut default_flags = CompileFlags::new();
        default_flags.set("std", FlagValue::Value("c11".to_string()));
        default_flags.set("ggdb", FlagValue::Enabled);
        LanguageConfig {
            name: "c".to_string(),
            kind: LanguageKind::Compiled,
            source_extension: "c".to_string(),
            compiler: Some(compiler.to_string()),
            default_flags,
            interpreter: None,
            leak_checker: None,
        }
    }

    #[test]
    fn test_compile_command() {
        let adapter = CompiledAdapter::new(language("clang"));

        let command = adapter
            .compile_command(&CompileRequest::new(["hello.c", "helpers.c"]))
            .unwrap();
        assert_eq!(command, "clang hello.c helpers.c -o hello -std=c11 -ggdb");

        let request = CompileRequest::new(["main.c"])
            .with_output("mario")
            .with_flag("ggdb", FlagValue::Disabled)
            .with_flag("Wall", FlagValue::Enabled);
        assert_eq!(
            adapter.compile_command(&request).unwrap(),
            "clang main.c -o mario -std=c11 -Wall"
        );

        // No output name can be derived from a non-source file
        let command = adapter
            .compile_command(&CompileRequest::new(["hello.o"]))
            .unwrap();
        assert_eq!(command, "clang hello.o -std=c11 -ggdb");
    }

    #[test]
    fn test_compile_requires_files() {
        let adapter = CompiledAdapter::new(language("clang"));
        let err = adapter
            .compile_command(&CompileRequest::new(Vec::<String>::new()))
            .unwrap_err();
        assert!(err.to_string().contains("at least one file"));
    }

    #[test]
    fn test_run_command() {
        let adapter = CompiledAdapter::new(language("clang"));
        assert_eq!(adapter.run_command("hello"), "./hello");
        assert_eq!(adapter.run_command("bin/hello"), "bin/hello");
    }

    #[tokio::test]
    async fn test_compile_failure_logs_truncated_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fakecc");
        fs::write(
            &script,
            "#!/bin/sh\nfor i in $(seq 1 30); do echo \"hello.c:$i: error\"; done\nexit 1\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let config = EngineConfig {
            max_log_lines: 10,
            ..EngineConfig::default()
        };
        let ctx = CheckContext::new("compiles", dir.path(), None, config);
        let adapter = CompiledAdapter::new(language(&script.display().to_string()));

        let err = adapter
            .compile(&ctx, &CompileRequest::new(["hello.c"]))
            .await
            .unwrap_err();
        assert_eq!(err.cause().rationale, "code failed to compile");

        let log = ctx.take_log();
        let compiler_lines: Vec<&String> = log.iter().filter(|l| l.contains("error")).collect();
        assert_eq!(compiler_lines.len(), 10);
        assert_eq!(compiler_lines[0], "hello.c:1: error");
        assert_eq!(compiler_lines[9], "hello.c:30: error");
    }

    #[tokio::test]
    async fn test_compile_success() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CheckContext::new("compiles", dir.path(), None, EngineConfig::default());
        let adapter = CompiledAdapter::new(language("true"));

        adapter
            .compile(&ctx, &CompileRequest::new(["hello.c"]))
            .await
            .unwrap();
    }
}
