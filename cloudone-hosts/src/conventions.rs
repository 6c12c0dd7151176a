//! Platform specific hosts file conventions

use std::path::PathBuf;

/// Hosts file location and formatting rules for one operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFileConventions {
    pub path: PathBuf,
    pub eol: &'static str,
    /// `None` means unlimited
    pub max_hosts_per_line: Option<usize>,
}

impl HostFileConventions {
    /// Conventions for the OS this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else {
            Self::posix()
        }
    }

    pub fn posix() -> Self {
        Self {
            path: PathBuf::from("/etc/hosts"),
            eol: "\n",
            max_hosts_per_line: None,
        }
    }

    pub fn windows() -> Self {
        Self {
            path: PathBuf::from(expand_env(r"${SystemRoot}\System32\drivers\etc\hosts")),
            eol: "\r\n",
            max_hosts_per_line: Some(9),
        }
    }

    /// Use a custom hosts file path, environment variables expanded
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = PathBuf::from(expand_env(path));
        self
    }
}

/// Expand `$VAR` and `${VAR}` references; unset variables expand to nothing
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            name
        } else if chars
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
        {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        } else {
            out.push('$');
            continue;
        };

        out.push_str(&std::env::var(&name).unwrap_or_default());
    }
    out
}
