//! A single line of a hosts file

use std::net::IpAddr;

const COMMENT_CHAR: char = '#';

/// Marks that can be attached to an entry so managers only touch lines they own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    /// The entry sits inside the CloudOne section
    Owned,
}

/// One parsed line of a hosts file: an IP with host names, a comment,
/// a blank line or a malformed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub ip: String,
    pub hosts: Vec<String>,
    pub raw: String,
    pub comment: Option<String>,
    error: Option<String>,
    marks: Vec<Mark>,
}

impl HostEntry {
    /// Parse a raw hosts file line
    pub fn parse(raw: &str) -> Self {
        let mut entry = Self::comment(raw);
        if entry.is_comment() {
            return entry;
        }

        let data = match raw.split_once(COMMENT_CHAR) {
            Some((data, comment)) => {
                let comment = comment.trim();
                if !comment.is_empty() {
                    entry.comment = Some(comment.to_string());
                }
                data
            }
            None => raw,
        };

        let mut fields = data.split_whitespace();
        let Some(raw_ip) = fields.next() else {
            return entry;
        };

        if raw_ip.parse::<IpAddr>().is_err() {
            entry.error = Some(format!("bad hosts entry: {raw:?}"));
            entry.comment = None;
            return entry;
        }

        entry.ip = raw_ip.to_string();
        entry.hosts = fields.map(str::to_string).collect();
        entry
    }

    /// Build a data entry from an IP and host names
    pub fn new(ip: impl Into<String>, hosts: Vec<String>) -> Self {
        let mut entry = Self {
            ip: ip.into(),
            hosts,
            raw: String::new(),
            comment: None,
            error: None,
            marks: Vec::new(),
        };
        entry.raw = entry.export();
        entry
    }

    /// Build an entry that is kept verbatim (comments and blank lines)
    pub fn comment(raw: impl Into<String>) -> Self {
        Self {
            ip: String::new(),
            hosts: Vec::new(),
            raw: raw.into(),
            comment: None,
            error: None,
            marks: Vec::new(),
        }
    }

    /// Serialize the entry back into a hosts file line
    pub fn export(&self) -> String {
        if !self.is_data() {
            return self.raw.clone();
        }
        let mut line = self.ip.clone();
        for host in &self.hosts {
            line.push(' ');
            line.push_str(host);
        }
        if let Some(comment) = &self.comment {
            line.push_str(" # ");
            line.push_str(comment);
        }
        line
    }

    /// Regenerate `raw` after the IP or host list changed
    pub fn regenerate(&mut self) {
        self.raw = self.export();
    }

    pub fn mark(&mut self, mark: Mark) {
        if !self.marks.contains(&mark) {
            self.marks.push(mark);
        }
    }

    pub fn is_marked_with(&self, mark: Mark) -> bool {
        self.marks.contains(&mark)
    }

    pub fn is_owned(&self) -> bool {
        self.is_marked_with(Mark::Owned) && self.is_data()
    }

    /// The whole line is a comment
    pub fn is_comment(&self) -> bool {
        self.raw.trim_start().starts_with(COMMENT_CHAR)
    }

    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty() && self.ip.is_empty()
    }

    pub fn is_malformed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// An IP with host names, safe to normalize
    pub fn is_data(&self) -> bool {
        !self.ip.is_empty() && !self.is_malformed()
    }

    /// Comment text with the leading `#` and surrounding space removed
    pub fn comment_text(&self) -> Option<&str> {
        if !self.is_comment() {
            return None;
        }
        let text = self.raw.trim();
        Some(text.strip_prefix(COMMENT_CHAR).unwrap_or(text).trim())
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h == host)
    }

    /// Deduplicate, then sort host names alphabetically
    pub fn normalize_hosts(&mut self) {
        if !self.is_data() {
            return;
        }
        self.hosts.sort();
        self.hosts.dedup();
        self.regenerate();
    }
}
