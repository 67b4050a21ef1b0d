//! Title-based feed filter.

use crate::config::FeedConfig;
use anyhow::Context;
use regex::{Regex, RegexBuilder};

/// Outcome of filtering one item title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted { download_path: Option<String> },
    Rejected,
}

/// A feed's include/exclude rules, compiled once at startup.
#[derive(Debug)]
pub struct FeedFilter {
    matchers: Vec<CompiledRule>,
    excludes: Vec<Regex>,
    default_path: Option<String>,
}

#[derive(Debug)]
struct CompiledRule {
    pattern: Regex,
    download_path: Option<String>,
}

impl FeedFilter {
    pub fn new(config: &FeedConfig) -> anyhow::Result<Self> {
        let matchers = config
            .matchers
            .iter()
            .map(|rule| {
                let pattern = compile(&rule.pattern)
                    .with_context(|| format!("invalid matcher pattern {:?}", rule.pattern))?;
                Ok(CompiledRule {
                    pattern,
                    download_path: rule.download_path.clone(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let excludes = config
            .exclude
            .iter()
            .map(|pattern| {
                compile(pattern).with_context(|| format!("invalid exclude pattern {pattern:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            matchers,
            excludes,
            default_path: config.download_path.clone(),
        })
    }

    /// Decides whether an item with this title should be handed off, and to
    /// which download path.
    ///
    /// An exclude match always wins. With no matchers configured, everything
    /// not excluded is accepted. Otherwise the first matching rule decides,
    /// its download path overriding the feed default.
    pub fn evaluate(&self, title: &str) -> Verdict {
        if self.excludes.iter().any(|pattern| pattern.is_match(title)) {
            return Verdict::Rejected;
        }

        if self.matchers.is_empty() {
            return Verdict::Accepted {
                download_path: self.default_path.clone(),
            };
        }

        for rule in &self.matchers {
            if rule.pattern.is_match(title) {
                return Verdict::Accepted {
                    download_path: rule
                        .download_path
                        .clone()
                        .or_else(|| self.default_path.clone()),
                };
            }
        }

        Verdict::Rejected
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}
