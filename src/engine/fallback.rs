use std::path::PathBuf;

/// Whether a fallback argument is treated as a path and confined.
///
/// Flags pass through. Anything with a separator, dot or tilde, and anything
/// that is not purely alphabetic, is a path.
fn is_path_like(token: &str) -> bool {
    if token.starts_with('-') || token.is_empty() {
        return false;
    }
    token.contains(['/', '\\', '.', '~']) || !token.chars().all(char::is_alphabetic)
}

/// Build the argv for a native fallback verb, replacing path-like arguments
/// with their confined absolute form.
pub fn native_argv(verb: &str, args: &[String], resolve: impl Fn(&str) -> PathBuf) -> Vec<String> {
    std::iter::once(verb.to_string())
        .chain(args.iter().map(|arg| {
            if is_path_like(arg) {
                resolve(arg).to_string_lossy().into_owned()
            } else {
                arg.clone()
            }
        }))
        .collect()
}
