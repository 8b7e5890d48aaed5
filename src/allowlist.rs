//! Advisory check for "official" links. A miss only flags the link; it never
//! blocks a save.

use std::collections::HashSet;

use url::Url;

use crate::config::AllowlistOptions;

pub const DEFAULT_TRUSTED_SUFFIXES: &[&str] = &[".gov.in", ".nic.in"];

pub const DEFAULT_TRUSTED_HOSTS: &[&str] = &[
    "ssc.gov.in",
    "upsc.gov.in",
    "ibps.in",
    "rrbcdg.gov.in",
    "mpsc.gov.in",
    "bpsc.bih.nic.in",
    "tnpsc.gov.in",
    "psc.nic.in",
    "ppsc.gov.in",
    "hpsc.gov.in",
    "gpsc.gujarat.gov.in",
    "kpsc.kar.nic.in",
    "rpsc.rajasthan.gov.in",
    "tspsc.gov.in",
    "wbpsc.gov.in",
    "jkpsc.nic.in",
    "opsc.gov.in",
    "uppsc.up.nic.in",
    "jpsc.gov.in",
    "portal.mcgm.gov.in",
    "punezp.mkcl.org",
];

#[derive(Debug, Clone)]
pub struct OfficialAllowlist {
    suffixes: Vec<String>,
    hosts: HashSet<String>,
}

impl Default for OfficialAllowlist {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRUSTED_SUFFIXES.iter().copied(),
            DEFAULT_TRUSTED_HOSTS.iter().copied(),
        )
    }
}

impl OfficialAllowlist {
    pub fn new<'a>(
        suffixes: impl IntoIterator<Item = &'a str>,
        hosts: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut list = Self {
            suffixes: Vec::new(),
            hosts: HashSet::new(),
        };
        list.extend(suffixes, hosts);
        list
    }

    /// Built-in entries plus whatever the config adds.
    pub fn from_options(options: &AllowlistOptions) -> Self {
        let mut list = Self::default();
        list.extend(
            options.suffixes.iter().map(String::as_str),
            options.hosts.iter().map(String::as_str),
        );
        list
    }

    fn extend<'a>(
        &mut self,
        suffixes: impl IntoIterator<Item = &'a str>,
        hosts: impl IntoIterator<Item = &'a str>,
    ) {
        for suffix in suffixes {
            let suffix = suffix.trim().trim_start_matches('.').to_ascii_lowercase();
            if suffix.is_empty() {
                continue;
            }
            let dotted = format!(".{suffix}");
            if !self.suffixes.contains(&dotted) {
                self.suffixes.push(dotted);
            }
        }
        for host in hosts {
            let host = host.trim().to_ascii_lowercase();
            if !host.is_empty() {
                self.hosts.insert(host);
            }
        }
    }

    pub fn is_official(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        self.suffixes.iter().any(|suffix| host.ends_with(suffix.as_str()))
            || self.hosts.contains(&host)
    }
}

/// Lowercased host of an absolute URL; `None` for anything unparseable or
/// host-less.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_ascii_lowercase)
}
