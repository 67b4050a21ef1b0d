//! Resolves a feed item to the link to hand off and the key to deduplicate on.

use crate::config::FeedConfig;
use regex::Regex;
use rss::Item;
use rss::extension::Extension;
use std::sync::LazyLock;

/// A standalone run of exactly 40 hex characters, the shape of a BitTorrent
/// info hash.
static INFO_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{40}\b").unwrap());

/// Extension element names that commonly carry an info hash, probed in order
/// across every namespace.
const HASH_ELEMENTS: [&str; 5] = ["infoHash", "info_hash", "infohash", "hash", "torrent_hash"];

/// The computed output of resolution for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// What gets handed to the download client.
    pub url: String,
    /// What gets checked against and recorded in the seen file. Differs from
    /// `url` when the feed deduplicates by guid.
    pub dedup_key: String,
}

/// Resolves the candidate link and dedup key for one item. `None` means the
/// item carries nothing usable and is dropped.
pub fn resolve(item: &Item, config: &FeedConfig) -> Option<ResolvedLink> {
    let url = resolve_url(item, config)?;

    let dedup_key = if config.seen_by_guid {
        match item.guid() {
            Some(guid) => guid.value().to_string(),
            None => url.clone(),
        }
    } else {
        url.clone()
    };

    Some(ResolvedLink { url, dedup_key })
}

/// Picks the link for one item: the configured custom field, a magnet link
/// built from an embedded info hash, the enclosure, then the plain link.
/// First non-empty value wins.
fn resolve_url(item: &Item, config: &FeedConfig) -> Option<String> {
    if let Some(field) = config.link_field.as_deref() {
        if let Some(value) = named_field(item, field) {
            return Some(value);
        }
    }

    if config.use_hash {
        if let Some(hash) = extract_info_hash(item) {
            return Some(magnet_link(&hash, item.title()));
        }
    }

    if let Some(enclosure) = item.enclosure() {
        if !enclosure.url().is_empty() {
            return Some(enclosure.url().to_string());
        }
    }

    item.link()
        .filter(|link| !link.is_empty())
        .map(str::to_string)
}

/// Looks up an item field by name: the built-in fields first, then extension
/// elements, addressed either namespace-qualified (`nyaa:magnetUrl`) or bare.
/// Empty values count as absent.
fn named_field(item: &Item, name: &str) -> Option<String> {
    let builtin = match name {
        "title" => item.title(),
        "link" => item.link(),
        "description" => item.description(),
        "content" => item.content(),
        "author" => item.author(),
        "comments" => item.comments(),
        "guid" => item.guid().map(|guid| guid.value()),
        "enclosure" => item.enclosure().map(|enclosure| enclosure.url()),
        _ => None,
    };
    if let Some(value) = builtin {
        return Some(value)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
    }

    let (prefix, element) = match name.split_once(':') {
        Some((prefix, element)) => (Some(prefix), element),
        None => (None, name),
    };

    item.extensions()
        .iter()
        .filter(|(namespace, _)| prefix.is_none_or(|prefix| prefix == namespace.as_str()))
        .filter_map(|(_, elements)| elements.get(element))
        .flatten()
        .find_map(|extension| extension.value())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Best-effort info-hash extraction, first match wins: commonly named
/// extension elements, then every extension element, then the item's other
/// scalar fields, then textual content, then the source element.
fn extract_info_hash(item: &Item) -> Option<String> {
    let named = HASH_ELEMENTS.iter().find_map(|element| {
        item.extensions()
            .values()
            .filter_map(|elements| elements.get(*element))
            .flatten()
            .find_map(hash_in_extension)
    });
    if named.is_some() {
        return named;
    }

    let any_extension = item
        .extensions()
        .values()
        .flat_map(|elements| elements.values())
        .flatten()
        .find_map(hash_in_extension);
    if any_extension.is_some() {
        return any_extension;
    }

    let attributes = [
        item.link(),
        item.guid().map(|guid| guid.value()),
        item.enclosure().map(|enclosure| enclosure.url()),
    ];
    if let Some(hash) = attributes.into_iter().flatten().find_map(hash_in_text) {
        return Some(hash);
    }

    let texts = [item.description(), item.content()];
    if let Some(hash) = texts.into_iter().flatten().find_map(hash_in_text) {
        return Some(hash);
    }

    let source = item.source()?;
    hash_in_text(source.url()).or_else(|| source.title().and_then(hash_in_text))
}

fn hash_in_extension(extension: &Extension) -> Option<String> {
    if let Some(hash) = extension.value().and_then(hash_in_text) {
        return Some(hash);
    }
    if let Some(hash) = extension.attrs().values().find_map(|value| hash_in_text(value)) {
        return Some(hash);
    }
    extension
        .children()
        .values()
        .flatten()
        .find_map(hash_in_extension)
}

fn hash_in_text(text: &str) -> Option<String> {
    INFO_HASH
        .find(text)
        .map(|token| token.as_str().to_ascii_lowercase())
}

/// Builds `magnet:?xt=urn:btih:<hash>`, with the title as display name when
/// one is present.
fn magnet_link(hash: &str, title: Option<&str>) -> String {
    let mut link = format!("magnet:?xt=urn:btih:{}", hash.to_ascii_lowercase());
    if let Some(title) = title.filter(|title| !title.is_empty()) {
        link.push_str("&dn=");
        link.extend(url::form_urlencoded::byte_serialize(title.as_bytes()));
    }
    link
}
