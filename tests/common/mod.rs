#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use grader::languages::{CompileFlags, FlagValue, LanguageConfig, LanguageKind};
use grader::EngineConfig;

pub const HELLO_C: &str = "#include <stdio.h>\n\nint main(void)\n{\n    printf(\"Hello, World!\\n\");\n}\n";
pub const BROKEN_C: &str = "int main(void)\n{\n    syntax error\n}\n";

/// Stand-in for a C compiler: rejects sources containing "syntax error",
/// otherwise writes an executable that prints a greeting.
const FAKE_CC: &str = r##"#!/bin/sh
src="$1"
out=""
while [ $# -gt 0 ]; do
    if [ "$1" = "-o" ]; then
        out="$2"
        shift
    fi
    shift
done
if grep -q "syntax error" "$src"; then
    echo "$src:3:5: error: use of undeclared identifier 'syntax'"
    echo "1 error generated."
    exit 1
fi
printf '#!/bin/sh\necho "Hello, World!"\n' > "$out"
chmod +x "$out"
"##;

pub struct Submission {
    _tmp: TempDir,
    /// Checkout root holding the submission
    pub root: PathBuf,
    /// Directory holding the fake toolchain and checks files
    pub tools: PathBuf,
}

impl Submission {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().join("submission");
        let tools = tmp.path().join("tools");
        fs::create_dir_all(&root).expect("create submission dir");
        fs::create_dir_all(&tools).expect("create tools dir");

        for (name, content) in files {
            let path = root.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create parent dir");
            }
            fs::write(path, content).expect("write submission file");
        }

        let cc = tools.join("fakecc");
        fs::write(&cc, FAKE_CC).expect("write fake compiler");
        fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).expect("chmod fake compiler");

        Self {
            _tmp: tmp,
            root,
            tools,
        }
    }

    pub fn compiler(&self) -> PathBuf {
        self.tools.join("fakecc")
    }

    /// C language entry that compiles with the fake compiler
    pub fn language(&self) -> LanguageConfig {
        let mut default_flags = CompileFlags::new();
        default_flags.set("std", FlagValue::Value("c11".to_string()));
        LanguageConfig {
            name: "c".to_string(),
            kind: LanguageKind::Compiled,
            source_extension: "c".to_string(),
            compiler: Some(self.compiler().display().to_string()),
            default_flags,
            interpreter: None,
            leak_checker: None,
        }
    }

    /// Language table (TOML) pointing at the fake compiler
    pub fn languages_toml(&self) -> String {
        format!(
            "[c]\nkind = \"compiled\"\nsource_extension = \"c\"\ncompiler = \"{}\"\ndefault_flags = {{ std = \"c11\" }}\n",
            self.compiler().display()
        )
    }

    pub fn write_tool(&self, name: &str, content: &str) -> PathBuf {
        let path = self.tools.join(name);
        fs::write(&path, content).expect("write tool file");
        path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Short timeouts so failing tests finish quickly
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        check_timeout_secs: 10,
        stdout_timeout_ms: 500,
        exit_timeout_ms: 2_000,
        compile_timeout_ms: 5_000,
        max_log_lines: 50,
    }
}

pub fn names(results: &[grader::CheckResult]) -> Vec<&str> {
    results.iter().map(|r| r.name.as_str()).collect()
}

pub fn exists_in(dir: &Path, name: &str) -> bool {
    dir.join(name).exists()
}
