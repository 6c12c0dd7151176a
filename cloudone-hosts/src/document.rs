//! Hosts file document with a CloudOne owned section
//!
//! Only data entries between the two sentinel comments are ever touched.
//! Everything else in the file (foreign entries, comments, blank lines and
//! malformed lines) is passed through verbatim.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::entry::{HostEntry, Mark};

/// Opening sentinel line of the owned section
pub const SECTION_START: &str = "# Added by CloudOne";
/// Closing sentinel line of the owned section
pub const SECTION_END: &str = "# End of CloudOne section";

const BOM: char = '\u{feff}';

fn sentinel_text(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix('#').unwrap_or(line).trim()
}

fn same_ip(a: &str, b: &str) -> bool {
    match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// An ordered list of hosts file entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostsDocument {
    entries: Vec<HostEntry>,
}

impl HostsDocument {
    /// Parse the full text of a hosts file and mark the owned section
    pub fn parse(content: &str) -> Self {
        let content = content.strip_prefix(BOM).unwrap_or(content);
        let mut document = Self {
            entries: content.lines().map(HostEntry::parse).collect(),
        };

        if let Some((start, end)) = document.section() {
            for entry in &mut document.entries[start + 1..end] {
                if entry.is_data() {
                    entry.mark(Mark::Owned);
                }
            }
        }
        document
    }

    /// Serialize every entry, each followed by `eol`
    pub fn export(&self, eol: &str) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.export());
            out.push_str(eol);
        }
        out
    }

    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }

    pub fn owned(&self) -> impl Iterator<Item = &HostEntry> {
        self.entries.iter().filter(|e| e.is_owned())
    }

    /// Indices of the start and end sentinels, if both are present
    ///
    /// The section opens at the start sentinel closest to the first end
    /// sentinel that follows one. An earlier unclosed start sentinel is left
    /// as a plain comment.
    pub fn section(&self) -> Option<(usize, usize)> {
        let start_text = sentinel_text(SECTION_START);
        let end_text = sentinel_text(SECTION_END);

        let mut start = None;
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.comment_text() {
                Some(text) if text == start_text => start = Some(index),
                Some(text) if text == end_text => {
                    if let Some(start) = start {
                        return Some((start, index));
                    }
                }
                _ => {}
            }
        }
        None
    }

    pub fn has_section(&self) -> bool {
        self.section().is_some()
    }

    /// Host names currently owned for `ip`
    pub fn owned_hosts(&self, ip: &str) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .owned()
            .filter(|e| same_ip(&e.ip, ip))
            .flat_map(|e| e.hosts.iter().cloned())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Bind `hosts` to `ip` inside the owned section
    ///
    /// The caller is expected to pass a validated IP and a non-empty list.
    pub fn add(&mut self, ip: &str, hosts: &[String], max_hosts_per_line: Option<usize>) {
        let existing = self
            .entries
            .iter()
            .position(|e| e.is_owned() && same_ip(&e.ip, ip));

        match existing {
            Some(index) => {
                let entry = &mut self.entries[index];
                for host in hosts {
                    if !entry.has_host(host) {
                        entry.hosts.push(host.clone());
                    }
                }
                entry.regenerate();
            }
            None => {
                let mut entry = HostEntry::new(ip, hosts.to_vec());
                entry.mark(Mark::Owned);
                match self.section() {
                    Some((_, end)) => self.entries.insert(end, entry),
                    None => {
                        self.entries.push(HostEntry::comment(SECTION_START));
                        self.entries.push(entry);
                        self.entries.push(HostEntry::comment(SECTION_END));
                    }
                }
            }
        }

        self.clean(max_hosts_per_line);
        self.enforce_exclusive(ip, hosts);
    }

    /// Unbind `hosts` from `ip`, dropping the section once it is empty
    pub fn remove(&mut self, ip: &str, hosts: &[String], max_hosts_per_line: Option<usize>) {
        self.entries.retain_mut(|entry| {
            if !entry.is_owned() || !same_ip(&entry.ip, ip) {
                return true;
            }
            entry.hosts.retain(|h| !hosts.contains(h));
            entry.regenerate();
            !entry.hosts.is_empty()
        });

        if self.owned().next().is_none() {
            if let Some((start, end)) = self.section() {
                self.entries.remove(end);
                self.entries.remove(start);
            }
        }

        self.clean(max_hosts_per_line);
    }

    /// Normalize the owned section
    ///
    /// Owned entries sharing an IP are merged into the first of them, their
    /// host lists are deduplicated and sorted, then entries longer than
    /// `max_hosts_per_line` are split into several lines with the same IP.
    pub fn clean(&mut self, max_hosts_per_line: Option<usize>) {
        self.consolidate_owned();

        for entry in self.entries.iter_mut().filter(|e| e.is_owned()) {
            entry.normalize_hosts();
        }

        let Some(max) = max_hosts_per_line.filter(|max| *max > 0) else {
            return;
        };

        let mut split = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if !entry.is_owned() || entry.hosts.len() <= max {
                split.push(entry);
                continue;
            }
            for (i, chunk) in entry.hosts.chunks(max).enumerate() {
                let mut line = HostEntry::new(entry.ip.clone(), chunk.to_vec());
                if i == 0 {
                    line.comment = entry.comment.clone();
                    line.regenerate();
                }
                line.mark(Mark::Owned);
                split.push(line);
            }
        }
        self.entries = split;
    }

    fn consolidate_owned(&mut self) {
        let mut first_for_ip: HashMap<IpAddr, usize> = HashMap::new();
        let mut merged = vec![false; self.entries.len()];

        for index in 0..self.entries.len() {
            let entry = &self.entries[index];
            if !entry.is_owned() {
                continue;
            }
            let Ok(ip) = entry.ip.parse::<IpAddr>() else {
                continue;
            };
            match first_for_ip.get(&ip) {
                Some(&first) => {
                    let hosts = std::mem::take(&mut self.entries[index].hosts);
                    self.entries[first].hosts.extend(hosts);
                    merged[index] = true;
                }
                None => {
                    first_for_ip.insert(ip, index);
                }
            }
        }

        let mut index = 0;
        self.entries.retain(|_| {
            let keep = !merged[index];
            index += 1;
            keep
        });
    }

    /// Remove each of `hosts` from owned entries bound to any IP other than `ip`
    pub fn enforce_exclusive(&mut self, ip: &str, hosts: &[String]) {
        self.entries.retain_mut(|entry| {
            if !entry.is_owned() || same_ip(&entry.ip, ip) {
                return true;
            }
            let before = entry.hosts.len();
            entry.hosts.retain(|h| !hosts.contains(h));
            if entry.hosts.len() != before {
                entry.regenerate();
            }
            !entry.hosts.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    const SYSTEM: &str = "127.0.0.1 localhost\n::1 localhost ip6-localhost\n";

    #[test]
    fn test_parse_marks_only_section_entries() {
        let content = "\u{feff}127.0.0.1 localhost\n\
                       # Added by CloudOne\n\
                       172.18.0.22 a.local\n\
                       # End of CloudOne section\n\
                       10.0.0.1 other.local\n";
        let document = HostsDocument::parse(content);
        assert_eq!(document.entries().len(), 5);
        assert_eq!(document.section(), Some((1, 3)));

        let owned: Vec<_> = document.owned().map(|e| e.ip.as_str()).collect();
        assert_eq!(owned, vec!["172.18.0.22"]);
        assert!(!document.entries()[0].is_owned());
        assert!(!document.entries()[4].is_owned());
        // BOM is stripped
        assert_eq!(document.entries()[0].ip, "127.0.0.1");
    }

    #[test]
    fn test_section_requires_both_sentinels() {
        let document = HostsDocument::parse("# Added by CloudOne\n172.18.0.22 a.local\n");
        assert!(!document.has_section());
        assert_eq!(document.owned().count(), 0);
    }

    #[test]
    fn test_unclosed_start_sentinel_stays_foreign() {
        let mut document = HostsDocument::parse("# Added by CloudOne\n10.0.0.1 foreign.local\n");
        document.add("172.18.0.22", &hosts(&["a.local"]), None);

        let reloaded = HostsDocument::parse(&document.export("\n"));
        let owned: Vec<_> = reloaded.owned().map(HostEntry::export).collect();
        assert_eq!(owned, vec!["172.18.0.22 a.local".to_string()]);
        assert_eq!(reloaded.section(), Some((2, 4)));
        assert!(!reloaded.entries()[1].is_owned());

        let mut reloaded = reloaded;
        reloaded.remove("172.18.0.22", &hosts(&["a.local"]), None);
        assert_eq!(
            reloaded.export("\n"),
            "# Added by CloudOne\n10.0.0.1 foreign.local\n"
        );
    }

    #[test]
    fn test_sentinel_match_ignores_spacing() {
        let document =
            HostsDocument::parse("  #Added by CloudOne  \n172.18.0.22 a.local\n#   End of CloudOne section\n");
        assert!(document.has_section());
        assert_eq!(document.owned().count(), 1);
    }

    #[test]
    fn test_add_creates_section() {
        let mut document = HostsDocument::parse("");
        document.add("172.18.0.22", &hosts(&["storage.local"]), None);
        assert_eq!(
            document.export("\n"),
            "# Added by CloudOne\n172.18.0.22 storage.local\n# End of CloudOne section\n"
        );
    }

    #[test]
    fn test_add_appends_after_foreign_content() {
        let mut document = HostsDocument::parse(SYSTEM);
        document.add("172.18.0.22", &hosts(&["a.local"]), None);
        let text = document.export("\n");
        assert!(text.starts_with(SYSTEM));
        assert!(text.ends_with("# End of CloudOne section\n"));
    }

    #[test]
    fn test_add_inserts_before_end_sentinel() {
        let mut document = HostsDocument::parse(SYSTEM);
        document.add("172.18.0.22", &hosts(&["a.local"]), None);
        document.add("172.18.0.23", &hosts(&["b.local"]), None);
        let (start, end) = document.section().unwrap();
        assert_eq!(end - start, 3);
        assert_eq!(document.entries()[end - 1].ip, "172.18.0.23");
    }

    #[test]
    fn test_add_unions_and_sorts() {
        let mut document = HostsDocument::parse("");
        document.add("172.18.0.22", &hosts(&["b.local", "a.local"]), None);
        document.add("172.18.0.22", &hosts(&["c.local", "a.local"]), None);
        assert_eq!(
            document.owned_hosts("172.18.0.22"),
            hosts(&["a.local", "b.local", "c.local"])
        );
        assert_eq!(document.owned().count(), 1);
    }

    #[test]
    fn test_add_moves_host_between_ips() {
        let mut document = HostsDocument::parse("");
        document.add("172.18.0.22", &hosts(&["a.local", "b.local"]), None);
        document.add("172.18.0.23", &hosts(&["a.local"]), None);
        assert_eq!(document.owned_hosts("172.18.0.22"), hosts(&["b.local"]));
        assert_eq!(document.owned_hosts("172.18.0.23"), hosts(&["a.local"]));

        // Moving the last host drops the now empty line
        document.add("172.18.0.23", &hosts(&["b.local"]), None);
        assert!(document.owned_hosts("172.18.0.22").is_empty());
        assert_eq!(document.owned().count(), 1);
    }

    #[test]
    fn test_add_leaves_foreign_entries_alone() {
        let mut document = HostsDocument::parse("172.18.0.99 a.local\n");
        document.add("172.18.0.22", &hosts(&["a.local"]), None);
        assert_eq!(document.entries()[0].export(), "172.18.0.99 a.local");
    }

    #[test]
    fn test_split_long_lines() {
        let mut document = HostsDocument::parse("");
        let names: Vec<String> = (0..11).map(|i| format!("h{i:02}.local")).collect();
        document.add("172.18.0.22", &names, Some(9));

        let owned: Vec<_> = document.owned().collect();
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].hosts.len(), 9);
        assert_eq!(owned[1].hosts.len(), 2);
        assert_eq!(owned[1].hosts, hosts(&["h09.local", "h10.local"]));

        // Re-adding consolidates then splits again without duplicating
        document.add("172.18.0.22", &hosts(&["h00.local"]), Some(9));
        assert_eq!(document.owned().count(), 2);
        assert_eq!(document.owned_hosts("172.18.0.22").len(), 11);
    }

    #[test]
    fn test_remove_drops_section_when_empty() {
        let mut document = HostsDocument::parse(SYSTEM);
        document.add("172.18.0.22", &hosts(&["a.local", "b.local"]), None);
        document.remove("172.18.0.22", &hosts(&["a.local"]), None);
        assert_eq!(document.owned_hosts("172.18.0.22"), hosts(&["b.local"]));
        assert!(document.has_section());

        document.remove("172.18.0.22", &hosts(&["b.local"]), None);
        assert!(!document.has_section());
        assert_eq!(document.export("\n"), SYSTEM);
    }

    #[test]
    fn test_remove_other_ip_is_noop() {
        let mut document = HostsDocument::parse("");
        document.add("172.18.0.22", &hosts(&["a.local"]), None);
        let before = document.clone();
        document.remove("172.18.0.23", &hosts(&["a.local"]), None);
        assert_eq!(document, before);
    }

    #[test]
    fn test_malformed_lines_pass_through() {
        let content = "garbage line here\n# Added by CloudOne\nnope x.local\n# End of CloudOne section\n";
        let mut document = HostsDocument::parse(content);
        document.add("172.18.0.22", &hosts(&["a.local"]), None);
        let text = document.export("\n");
        assert!(text.contains("garbage line here\n"));
        assert!(text.contains("nope x.local\n"));
    }
}
