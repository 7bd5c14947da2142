//! robots.txt handling
//!
//! Standard Allow/Disallow matching with `*` wildcards and `$` end anchors.
//! The longest matching rule wins; on a tie, Allow wins. A missing,
//! malformed, or non-2xx robots.txt means everything is allowed.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;

/// Budget for fetching a robots.txt file
pub const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Hosts cached per job
const ROBOTS_CACHE_SIZE: usize = 1_000;

/// One user-agent group from a robots.txt file.
///
/// Consecutive `User-agent` lines share a group; the first rule line closes
/// the agent list.
#[derive(Debug, Default)]
struct RuleGroup {
    agents: Vec<String>,
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RuleGroup {
    fn names_agent(&self, wanted: &str) -> bool {
        self.agents.iter().any(|a| a != "*" && wanted.contains(a.as_str()))
    }

    fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|a| a == "*")
    }
}

/// Parsed robots.txt rules for one host
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    allow_rules: Vec<String>,
    disallow_rules: Vec<String>,
}

impl RobotsPolicy {
    /// Parse robots.txt content for the given user agent.
    ///
    /// A group naming this agent takes precedence over the `*` group; with
    /// neither present, everything is allowed.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let groups = Self::split_groups(content);
        let wanted = user_agent.to_ascii_lowercase();

        let chosen = groups
            .iter()
            .find(|g| g.names_agent(&wanted))
            .or_else(|| groups.iter().find(|g| g.is_wildcard()));

        match chosen {
            Some(group) => Self {
                allow_rules: group.allow.clone(),
                disallow_rules: group.disallow.clone(),
            },
            None => Self::allow_all(),
        }
    }

    /// Split a robots.txt file into user-agent groups, dropping anything
    /// that is not a `User-agent`/`Allow`/`Disallow` directive.
    fn split_groups(content: &str) -> Vec<RuleGroup> {
        let mut groups: Vec<RuleGroup> = Vec::new();
        let mut agents_open = false;

        for raw in content.lines() {
            // Inline comments run to the end of the line
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if !agents_open {
                        groups.push(RuleGroup::default());
                        agents_open = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                directive @ ("allow" | "disallow") => {
                    agents_open = false;
                    // An empty rule value matches nothing
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(group) = groups.last_mut() {
                        if directive == "allow" {
                            group.allow.push(value.to_string());
                        } else {
                            group.disallow.push(value.to_string());
                        }
                    }
                }
                _ => agents_open = false,
            }
        }

        groups
    }

    /// Policy that allows everything; used when robots.txt cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            allow_rules: Vec::new(),
            disallow_rules: Vec::new(),
        }
    }

    /// Check whether a path is allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let best_match = |rules: &[String]| {
            rules
                .iter()
                .filter(|rule| Self::pattern_matches(path, rule))
                .map(|rule| rule.len())
                .max()
                .unwrap_or(0)
        };

        best_match(&self.allow_rules) >= best_match(&self.disallow_rules)
    }

    /// Match a path against a robots.txt rule with `*` and `$` support.
    ///
    /// An unanchored rule matches any path it is a (glob) prefix of.
    fn pattern_matches(path: &str, rule: &str) -> bool {
        if rule.is_empty() {
            return false;
        }
        let (body, anchored) = match rule.strip_suffix('$') {
            Some(stripped) => (stripped, true),
            None => (rule, false),
        };
        glob_from_start(path.as_bytes(), body.as_bytes(), anchored)
    }
}

/// Glob `pattern` against the head of `path`. `*` spans any run of bytes;
/// with `anchored` the whole path must be consumed.
fn glob_from_start(path: &[u8], pattern: &[u8], anchored: bool) -> bool {
    match pattern.split_first() {
        None => !anchored || path.is_empty(),
        Some((b'*', rest)) => {
            (0..=path.len()).any(|skip| glob_from_start(&path[skip..], rest, anchored))
        }
        Some((expected, rest)) => match path.split_first() {
            Some((byte, tail)) => byte == expected && glob_from_start(tail, rest, anchored),
            None => false,
        },
    }
}

/// Per-job robots.txt gate: one fetch per host, cached
pub struct RobotsCache {
    cache: Mutex<LruCache<String, Arc<RobotsPolicy>>>,
    client: reqwest::Client,
    user_agent: String,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        let capacity = NonZeroUsize::new(ROBOTS_CACHE_SIZE).expect("nonzero cache size");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            client,
            user_agent: user_agent.into(),
        }
    }

    /// Whether the configured user agent may fetch this URL.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str().map(|h| h.to_string()) else {
            return true;
        };

        let cached = self.cache.lock().get(&host).cloned();
        let policy = match cached {
            Some(policy) => policy,
            None => {
                let policy = Arc::new(self.fetch_policy(url.scheme(), &host).await);
                self.cache.lock().put(host, Arc::clone(&policy));
                policy
            }
        };

        policy.is_allowed(url.path())
    }

    async fn fetch_policy(&self, scheme: &str, host: &str) -> RobotsPolicy {
        let robots_url = format!("{}://{}/robots.txt", scheme, host);
        let request = self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .header(reqwest::header::USER_AGENT, &self.user_agent);

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(content) => RobotsPolicy::parse(&content, &self.user_agent),
                Err(e) => {
                    debug!("robots.txt body read failed for {}: {}", robots_url, e);
                    RobotsPolicy::allow_all()
                }
            },
            Ok(response) => {
                debug!(
                    "robots.txt at {} returned {}; allowing all",
                    robots_url,
                    response.status()
                );
                RobotsPolicy::allow_all()
            }
            Err(e) => {
                debug!("robots.txt fetch failed for {}: {}", robots_url, e);
                RobotsPolicy::allow_all()
            }
        }
    }
}
