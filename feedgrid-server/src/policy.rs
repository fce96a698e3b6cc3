use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// Newline-delimited IP ban list, reloaded whenever the backing file's mtime changes.
///
/// The file is read-only from the server's perspective - nothing here ever writes to it, only
/// watches and re-reads. A missing file is treated as an empty ban list rather than an error, so
/// a deployment with no `banned.txt` simply never rejects on IP.
#[derive(Debug, Clone)]
pub struct BannedIps {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl BannedIps {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.inner.read().contains(ip)
    }

    fn reload(&self, path: &std::path::Path) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return,
        };

        let ips: HashSet<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        info!(count = ips.len(), path = %path.display(), "reloaded banned IP list");
        *self.inner.write() = ips;
    }

    /// Poll `path`'s mtime on a fixed tick, reloading the set whenever it changes. Runs until the
    /// process exits - there is no unsubscribe, matching the other ambient background tasks.
    pub fn watch(self, path: PathBuf, poll: std::time::Duration) {
        tokio::spawn(async move {
            self.reload(&path);
            let mut last_modified: Option<SystemTime> = modified_at(&path);

            let mut ticker = tokio::time::interval(poll);
            loop {
                ticker.tick().await;
                let modified = modified_at(&path);
                if modified != last_modified {
                    last_modified = modified;
                    self.reload(&path);
                }
            }
        });
    }
}

impl Default for BannedIps {
    fn default() -> Self {
        Self::new()
    }
}

fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Compiles the configured origin-allow regex once at startup; a missing pattern accepts every
/// origin.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allow: Option<Regex>,
}

impl OriginPolicy {
    pub fn new(pattern: Option<&str>) -> Self {
        let allow = pattern.and_then(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(error) => {
                warn!(pattern, %error, "origin pattern failed to compile, rejecting no origins");
                None
            }
        });
        Self { allow }
    }

    /// `None` means "no Origin header restriction configured" - every request passes.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (&self.allow, origin) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(regex), Some(origin)) => regex.is_match(origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pattern_allows_every_origin() {
        let policy = OriginPolicy::new(None);
        assert!(policy.allows(Some("https://evil.example")));
        assert!(policy.allows(None));
    }

    #[test]
    fn pattern_rejects_non_matching_origins() {
        let policy = OriginPolicy::new(Some(r"^https://([a-z0-9-]+\.)?feedgrid\.io$"));
        assert!(policy.allows(Some("https://feedgrid.io")));
        assert!(policy.allows(Some("https://app.feedgrid.io")));
        assert!(!policy.allows(Some("https://evil.example")));
        assert!(!policy.allows(None));
    }

    #[test]
    fn banned_ips_starts_empty_and_reloads_from_file() {
        let dir = std::env::temp_dir().join(format!("feedgrid-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("banned.txt");
        std::fs::write(&path, "1.2.3.4\n5.6.7.8\n").unwrap();

        let banned = BannedIps::new();
        banned.reload(&path);

        assert!(banned.contains("1.2.3.4"));
        assert!(banned.contains("5.6.7.8"));
        assert!(!banned.contains("9.9.9.9"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
