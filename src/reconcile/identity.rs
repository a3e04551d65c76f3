//! Identity resolution: titles to canonical tracker ids, and free-text aliases
//!
//! `AliasKey` normalizes a title for prose matching (leading ordinal dropped,
//! lower-cased, whitespace collapsed). `resolve_alias` is pure so the
//! matching rules are testable without a tracker.

use super::context::ReconciliationContext;
use crate::error::{ReconcileError, ReconcileResult};
use crate::graph::Title;
use crate::tracker::{ItemId, ItemStatus, StatusFilter, Tracker, TrackerResult, WorkItem};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Aliases shorter than this match too much prose to be useful
const MIN_ALIAS_LEN: usize = 3;

/// Normalized lookup string derived from a title
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AliasKey(String);

impl AliasKey {
    /// Derive the key for a title: strip a leading short ordinal token
    /// (`01`, `3.`, `#4`, `2a)`) and any separator after it.
    pub fn from_title(title: &str) -> Self {
        let normalized = normalize_text(title);
        let mut tokens: Vec<&str> = normalized.split(' ').collect();
        if tokens.len() > 1 && is_ordinal_token(tokens[0]) {
            tokens.remove(0);
            if tokens.len() > 1 && is_separator_token(tokens[0]) {
                tokens.remove(0);
            }
        }
        Self(tokens.join(" "))
    }

    /// Use free text as an alias verbatim (lower-cased, whitespace collapsed).
    pub fn literal(text: &str) -> Self {
        Self(normalize_text(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AliasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-case and collapse runs of whitespace to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_ordinal_token(token: &str) -> bool {
    if token.chars().count() > 4 {
        return false;
    }
    let body = token.strip_prefix('#').unwrap_or(token);
    let body = body
        .strip_suffix(|c: char| matches!(c, '.' | ')' | ':' | '-'))
        .unwrap_or(body);
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return false;
    }
    let rest = &body[digits..];
    rest.is_empty() || (rest.len() == 1 && rest.chars().all(|c| c.is_ascii_alphabetic()))
}

fn is_separator_token(token: &str) -> bool {
    matches!(token, "-" | "–" | "—" | ":" | "." | "|")
}

/// Alias → title lookup table, many aliases to one title
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<AliasKey, Title>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from titles, keyed by `AliasKey::from_title`.
    pub fn from_titles<'t>(titles: impl IntoIterator<Item = &'t Title>) -> Self {
        let mut table = Self::new();
        for title in titles {
            table.insert(AliasKey::from_title(title.as_str()), title.clone());
        }
        table
    }

    /// Add an alias. The first title registered for a key keeps it.
    pub fn insert(&mut self, key: AliasKey, title: Title) -> bool {
        if key.as_str().chars().count() < MIN_ALIAS_LEN {
            debug!(alias = %key, %title, "alias too short to match prose, skipped");
            return false;
        }
        match self.entries.get(&key) {
            Some(existing) if existing != &title => {
                warn!(alias = %key, kept = %existing, ignored = %title, "alias claimed by two titles");
                false
            }
            Some(_) => false,
            None => {
                self.entries.insert(key, title);
                true
            }
        }
    }

    pub fn get(&self, key: &AliasKey) -> Option<&Title> {
        self.entries.get(key)
    }

    /// Aliases in match order: longest first, then lexical.
    pub fn iter(&self) -> impl Iterator<Item = (&AliasKey, &Title)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|(a, _), (b, _)| b.0.len().cmp(&a.0.len()).then_with(|| a.cmp(b)));
        entries.into_iter()
    }

    pub fn titles(&self) -> BTreeSet<&Title> {
        self.entries.values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// First alias contained in `text`, case-insensitively.
///
/// Aliases are tried longest first so "payments sdk" wins over "payments"
/// on the same line.
pub fn resolve_alias<'t>(text: &str, table: &'t AliasTable) -> Option<&'t Title> {
    let haystack = normalize_text(text);
    table
        .iter()
        .find(|(key, _)| haystack.contains(key.as_str()))
        .map(|(_, title)| title)
}

/// Every title whose alias occurs in `text`.
///
/// Matches are claimed longest first; an occurrence inside a longer alias
/// already matched ("payments" within "payments sdk") does not count.
pub fn find_aliases<'t>(text: &str, table: &'t AliasTable) -> BTreeSet<&'t Title> {
    let haystack = normalize_text(text);
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut found = BTreeSet::new();
    for (key, title) in table.iter() {
        let free: Vec<(usize, usize)> = haystack
            .match_indices(key.as_str())
            .map(|(start, m)| (start, start + m.len()))
            .filter(|&(start, end)| !claimed.iter().any(|&(s, e)| start < e && s < end))
            .collect();
        if !free.is_empty() {
            found.insert(title);
            claimed.extend(free);
        }
    }
    found
}

/// The canonical item chosen for a title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub canonical: ItemId,
    pub status: ItemStatus,
    /// Other active items sharing the title
    pub duplicates: Vec<ItemId>,
}

impl Resolution {
    pub fn active(id: ItemId) -> Self {
        Self {
            canonical: id,
            status: ItemStatus::Active,
            duplicates: Vec::new(),
        }
    }
}

/// Title → canonical id map for one run
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    entries: BTreeMap<Title, Resolution>,
}

impl IdentityMap {
    pub fn insert(&mut self, title: Title, resolution: Resolution) {
        self.entries.insert(title, resolution);
    }

    pub fn get(&self, title: &Title) -> Option<&Resolution> {
        self.entries.get(title)
    }

    pub fn get_mut(&mut self, title: &Title) -> Option<&mut Resolution> {
        self.entries.get_mut(title)
    }

    /// Canonical id regardless of status.
    pub fn id(&self, title: &Title) -> Option<ItemId> {
        self.entries.get(title).map(|r| r.canonical)
    }

    /// Canonical id only if that item is active.
    pub fn active_id(&self, title: &Title) -> Option<ItemId> {
        self.entries
            .get(title)
            .filter(|r| r.status == ItemStatus::Active)
            .map(|r| r.canonical)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Title, &Resolution)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pick the canonical item among tracker results for `title`.
///
/// Only exact title matches count. Active beats retired; among active items
/// the lowest id wins; among retired ones the most recently created.
pub fn choose_canonical(title: &Title, items: &[WorkItem]) -> Option<Resolution> {
    let matches: Vec<&WorkItem> = items
        .iter()
        .filter(|item| item.title.trim() == title.as_str())
        .collect();

    let mut active: Vec<ItemId> = matches.iter().filter(|i| i.is_active()).map(|i| i.id).collect();
    active.sort();
    if let Some((&canonical, rest)) = active.split_first() {
        return Some(Resolution {
            canonical,
            status: ItemStatus::Active,
            duplicates: rest.to_vec(),
        });
    }

    matches
        .iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        .map(|item| Resolution {
            canonical: item.id,
            status: item.status,
            duplicates: Vec::new(),
        })
}

/// Query the tracker for one title.
pub async fn resolve_title(tracker: &dyn Tracker, title: &Title) -> TrackerResult<Option<Resolution>> {
    let items = tracker.list_items(title.as_str(), StatusFilter::Any).await?;
    Ok(choose_canonical(title, &items))
}

/// Resolve every title in `ctx.titles` into `ctx.identity`.
///
/// Losing connectivity aborts the run; other per-title failures leave the
/// title unresolved, listed in `ctx.lookup_failed`, and are counted as
/// warnings.
pub async fn resolve_identities(ctx: &mut ReconciliationContext, tracker: &dyn Tracker) -> ReconcileResult<()> {
    let titles: Vec<Title> = ctx.titles.iter().cloned().collect();
    for title in titles {
        match resolve_title(tracker, &title).await {
            Ok(Some(resolution)) => {
                if !resolution.duplicates.is_empty() {
                    warn!(
                        %title,
                        canonical = %resolution.canonical,
                        duplicates = ?resolution.duplicates,
                        "several active items share a title; lowest id is canonical"
                    );
                }
                debug!(%title, id = %resolution.canonical, status = ?resolution.status, "resolved");
                ctx.identity.insert(title, resolution);
            }
            Ok(None) => debug!(%title, "no item yet"),
            Err(e) if e.is_connectivity() => {
                return Err(ReconcileError::ConnectivityLost(e.to_string()));
            }
            Err(e) => {
                ctx.report.warn(&ReconcileError::Tracker(e));
                ctx.lookup_failed.insert(title);
            }
        }
    }
    info!(
        resolved = ctx.identity.len(),
        titles = ctx.titles.len(),
        "identity resolution finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkMode;
    use crate::tracker::InMemoryTracker;
    use chrono::{TimeZone, Utc};

    fn item(id: u64, title: &str, status: ItemStatus, day: u32) -> WorkItem {
        WorkItem {
            id: ItemId(id),
            title: title.to_string(),
            status,
            created_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn alias_key_strips_leading_ordinals() {
        assert_eq!(AliasKey::from_title("01 - User Authentication").as_str(), "user authentication");
        assert_eq!(AliasKey::from_title("3. Payments").as_str(), "payments");
        assert_eq!(AliasKey::from_title("#12 Feed   Ranking").as_str(), "feed ranking");
        assert_eq!(AliasKey::from_title("2a) Referral Codes").as_str(), "referral codes");
    }

    #[test]
    fn alias_key_keeps_non_ordinal_prefixes() {
        assert_eq!(AliasKey::from_title("2FA Enrollment").as_str(), "2fa enrollment");
        assert_eq!(AliasKey::from_title("12345 Migration").as_str(), "12345 migration");
        assert_eq!(AliasKey::from_title("42").as_str(), "42");
    }

    #[test]
    fn resolve_alias_is_case_insensitive_containment() {
        let titles = [Title::new("01 - Payments"), Title::new("Feed Ranking")];
        let table = AliasTable::from_titles(&titles);

        let hit = resolve_alias("- Needs the PAYMENTS   flow first", &table);
        assert_eq!(hit, Some(&titles[0]));
        assert_eq!(resolve_alias("nothing relevant", &table), None);
    }

    #[test]
    fn longest_alias_wins_on_a_line() {
        let titles = [Title::new("Payments"), Title::new("Payments SDK")];
        let table = AliasTable::from_titles(&titles);

        assert_eq!(resolve_alias("wire up the payments sdk", &table), Some(&titles[1]));
        assert_eq!(resolve_alias("payments backend", &table), Some(&titles[0]));
    }

    #[test]
    fn find_aliases_returns_all_mentions() {
        let titles = [Title::new("Payments"), Title::new("Referrals"), Title::new("Feed")];
        let table = AliasTable::from_titles(&titles);

        let found = find_aliases("Referrals pay out through Payments.", &table);
        assert_eq!(found.len(), 2);
        assert!(!found.contains(&titles[2]));
    }

    #[test]
    fn nested_alias_is_not_a_separate_mention() {
        let titles = [Title::new("Payments"), Title::new("Payments SDK"), Title::new("Feed")];
        let table = AliasTable::from_titles(&titles);

        let found = find_aliases("Feed ships on the Payments SDK.", &table);
        assert_eq!(found, BTreeSet::from([&titles[1], &titles[2]]));

        let both = find_aliases("Payments first, then the Payments SDK.", &table);
        assert_eq!(both, BTreeSet::from([&titles[0], &titles[1]]));
    }

    #[test]
    fn short_and_conflicting_aliases_are_skipped() {
        let mut table = AliasTable::new();
        assert!(!table.insert(AliasKey::literal("ux"), Title::new("UX Polish")));
        assert!(table.insert(AliasKey::literal("auth"), Title::new("Login")));
        assert!(!table.insert(AliasKey::literal("Auth"), Title::new("Signup")));
        assert_eq!(table.get(&AliasKey::literal("auth")), Some(&Title::new("Login")));
    }

    #[test]
    fn active_item_wins_regardless_of_order() {
        let title = Title::new("Payments");
        let a = [
            item(7, "Payments", ItemStatus::Retired, 9),
            item(3, "Payments", ItemStatus::Active, 1),
        ];
        let mut b = a.clone();
        b.reverse();

        let ra = choose_canonical(&title, &a).unwrap();
        let rb = choose_canonical(&title, &b).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(ra.canonical, ItemId(3));
        assert_eq!(ra.status, ItemStatus::Active);
    }

    #[test]
    fn two_active_items_pick_lowest_id() {
        let title = Title::new("Payments");
        let items = [
            item(9, "Payments", ItemStatus::Active, 2),
            item(4, "Payments", ItemStatus::Active, 3),
        ];
        let resolution = choose_canonical(&title, &items).unwrap();
        assert_eq!(resolution.canonical, ItemId(4));
        assert_eq!(resolution.duplicates, vec![ItemId(9)]);
    }

    #[test]
    fn only_retired_picks_most_recent() {
        let title = Title::new("Payments");
        let items = [
            item(2, "Payments", ItemStatus::Retired, 5),
            item(5, "Payments", ItemStatus::Retired, 3),
        ];
        let resolution = choose_canonical(&title, &items).unwrap();
        assert_eq!(resolution.canonical, ItemId(2));
        assert_eq!(resolution.status, ItemStatus::Retired);
    }

    #[test]
    fn substring_titles_are_not_matches() {
        let title = Title::new("Payments");
        let items = [item(1, "Payments SDK", ItemStatus::Active, 1)];
        assert!(choose_canonical(&title, &items).is_none());
    }

    #[tokio::test]
    async fn resolve_identities_fills_map() {
        let tracker = InMemoryTracker::new();
        let id = tracker.seed_item("Payments", ItemStatus::Active);
        let mut ctx = ReconciliationContext::new(LinkMode::Auto, false);
        ctx.titles.insert(Title::new("Payments"));
        ctx.titles.insert(Title::new("Missing"));

        resolve_identities(&mut ctx, &tracker).await.unwrap();
        assert_eq!(ctx.identity.active_id(&Title::new("Payments")), Some(id));
        assert_eq!(ctx.identity.id(&Title::new("Missing")), None);
    }

    #[tokio::test]
    async fn rejected_lookup_is_recorded_not_missing() {
        let tracker = InMemoryTracker::new();
        tracker.seed_item("Payments", ItemStatus::Active);
        tracker.reject_next_lookup("Payments");
        let mut ctx = ReconciliationContext::new(LinkMode::Auto, false);
        ctx.titles.insert(Title::new("Payments"));
        ctx.titles.insert(Title::new("Missing"));

        resolve_identities(&mut ctx, &tracker).await.unwrap();
        assert_eq!(ctx.identity.id(&Title::new("Payments")), None);
        assert_eq!(ctx.lookup_failed, BTreeSet::from([Title::new("Payments")]));
        assert_eq!(ctx.report.warnings["tracker"], 1);
    }

    #[tokio::test]
    async fn offline_tracker_aborts_resolution() {
        let tracker = InMemoryTracker::new();
        tracker.set_offline(true);
        let mut ctx = ReconciliationContext::new(LinkMode::Auto, false);
        ctx.titles.insert(Title::new("Payments"));

        let err = resolve_identities(&mut ctx, &tracker).await.unwrap_err();
        assert!(matches!(err, ReconcileError::ConnectivityLost(_)));
    }
}
