use super::{arg, count_value, Builtin, CommandError};
use crate::engine::Engine;
use regex::RegexBuilder;
use std::fs;
use std::path::Path;

const DEFAULT_LINES: usize = 10;

/// Read a file as text, replacing invalid sequences.
fn read_lossy(path: &Path) -> Result<String, CommandError> {
    let bytes = fs::read(path).map_err(|e| CommandError::io("Could not read file", e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `[-n N] <path>` for head and tail.
fn line_count_args<'a>(args: &'a [String], usage: &str) -> Result<(usize, &'a str), CommandError> {
    let mut count = DEFAULT_LINES;
    let mut path = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-n" => {
                count = count_value("-n", args.get(i + 1))?;
                i += 1;
            }
            p if path.is_none() => path = Some(p),
            _ => return Err(CommandError::usage(usage)),
        }
        i += 1;
    }
    let path = path.ok_or_else(|| CommandError::usage(usage))?;
    Ok((count, path))
}

pub struct Head;

impl Builtin for Head {
    fn name(&self) -> &'static str {
        "head"
    }

    fn usage(&self) -> &'static str {
        "head [-n N] <path>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let (count, target) = line_count_args(args, self.usage())?;
        let text = read_lossy(&engine.resolve_file(target)?)?;
        Ok(text.lines().take(count).collect::<Vec<_>>().join("\n"))
    }
}

pub struct Tail;

impl Builtin for Tail {
    fn name(&self) -> &'static str {
        "tail"
    }

    fn usage(&self) -> &'static str {
        "tail [-n N] <path>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let (count, target) = line_count_args(args, self.usage())?;
        let text = read_lossy(&engine.resolve_file(target)?)?;
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(count);
        Ok(lines[start..].join("\n"))
    }
}

/// Line matcher: a regex when requested and valid, otherwise a plain substring.
enum Matcher {
    Regex(regex::Regex),
    Substring { needle: String, ignore_case: bool },
}

impl Matcher {
    fn new(pattern: &str, use_regex: bool, ignore_case: bool) -> Self {
        if use_regex {
            match RegexBuilder::new(pattern).case_insensitive(ignore_case).build() {
                Ok(re) => return Matcher::Regex(re),
                Err(e) => tracing::debug!("invalid regex {:?}, matching literally: {}", pattern, e),
            }
        }
        let needle = if ignore_case {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        Matcher::Substring {
            needle,
            ignore_case,
        }
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(line),
            Matcher::Substring {
                needle,
                ignore_case: true,
            } => line.to_lowercase().contains(needle.as_str()),
            Matcher::Substring { needle, .. } => line.contains(needle.as_str()),
        }
    }
}

pub struct Grep;

impl Builtin for Grep {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn usage(&self) -> &'static str {
        "grep [-i] [-E] <pattern> <path>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let mut ignore_case = false;
        let mut use_regex = false;
        let mut operands = Vec::new();
        for a in args {
            match a.as_str() {
                "-i" => ignore_case = true,
                "-E" => use_regex = true,
                _ => operands.push(a.as_str()),
            }
        }
        let [pattern, target] = operands[..] else {
            return Err(CommandError::usage(self.usage()));
        };

        let text = read_lossy(&engine.resolve_file(target)?)?;
        let matcher = Matcher::new(pattern, use_regex, ignore_case);
        let hits: Vec<String> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| matcher.is_match(line))
            .map(|(i, line)| format!("{}:{}", i + 1, line))
            .collect();
        Ok(hits.join("\n"))
    }
}

pub struct Wc;

impl Builtin for Wc {
    fn name(&self) -> &'static str {
        "wc"
    }

    fn usage(&self) -> &'static str {
        "wc [-l|-w|-c] <path>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let (mode, target) = match args.first().map(String::as_str) {
            Some(flag @ ("-l" | "-w" | "-c")) => (Some(flag), arg(args, 1, self.usage())?),
            Some(_) => (None, arg(args, 0, self.usage())?),
            None => return Err(CommandError::usage(self.usage())),
        };
        let path = engine.resolve_file(target)?;
        let text = read_lossy(&path)?;

        let lines = text.lines().count();
        let words = text.split_whitespace().count();
        let chars = text.chars().count();
        Ok(match mode {
            Some("-l") => lines.to_string(),
            Some("-w") => words.to_string(),
            Some(_) => chars.to_string(),
            None => format!("{} {} {} {}", lines, words, chars, file_name(&path)),
        })
    }
}
