/// Maps a resolved fallback argv onto what the host can actually execute.
pub trait ArgTranslator: Send + Sync {
    fn translate(&self, argv: Vec<String>) -> Vec<String>;
}

/// POSIX hosts run the verbs directly.
pub struct PosixTranslator;

impl ArgTranslator for PosixTranslator {
    fn translate(&self, argv: Vec<String>) -> Vec<String> {
        argv
    }
}

/// Windows hosts route the common verbs through PowerShell cmdlets.
pub struct PowerShellTranslator;

const POWERSHELL: [&str; 3] = ["powershell", "-NoProfile", "-Command"];

fn powershell(rest: impl IntoIterator<Item = String>) -> Vec<String> {
    POWERSHELL
        .iter()
        .map(|s| s.to_string())
        .chain(rest)
        .collect()
}

fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "''"))
}

fn per_target(args: &[String], template: &str, missing: &str) -> Vec<String> {
    if args.is_empty() {
        return powershell(["Write-Output".to_string(), quote(missing)]);
    }
    let script = args
        .iter()
        .map(|a| format!("{} {}", template, quote(a)))
        .collect::<Vec<_>>()
        .join(" ; ");
    powershell([script])
}

impl ArgTranslator for PowerShellTranslator {
    fn translate(&self, argv: Vec<String>) -> Vec<String> {
        let Some((verb, args)) = argv.split_first() else {
            return argv;
        };

        match verb.to_lowercase().as_str() {
            "ls" | "dir" => {
                let mut out = powershell(
                    ["Get-ChildItem", "-Force", "-Name"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                if !args.is_empty() {
                    out.push("--%".to_string());
                    out.extend(args.iter().cloned());
                }
                out
            }
            "mkdir" => per_target(
                args,
                "New-Item -ItemType Directory -Force -Path",
                "Error: missing directory name",
            ),
            "rmdir" => per_target(
                args,
                "Remove-Item -Recurse -Force",
                "Error: missing directory name",
            ),
            "echo" => powershell(["Write-Output".to_string(), args.join(" ")]),
            _ => argv,
        }
    }
}

/// The translator for the host this binary was built for.
pub fn host_translator() -> Box<dyn ArgTranslator> {
    if cfg!(windows) {
        Box::new(PowerShellTranslator)
    } else {
        Box::new(PosixTranslator)
    }
}
