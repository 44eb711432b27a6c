//! Result aggregation.
//!
//! Results are grouped into a tree keyed by target. Each distinct target
//! (trailing `/` ignored) becomes one node holding the results aimed at it.
//! A node hangs under the longest other target that is a prefix of it at a
//! path boundary, or under the root when there is none. So
//! `http://a.com/` and `http://a.com/b` give `http://a.com` → `http://a.com/b`,
//! while `http://a.com/b` and `http://a.com/c` alone are two top-level groups.
//! Siblings keep the order in which their targets first appear.

use std::collections::HashMap;

use serde::Serialize;

use crate::probe::WatchdogResult;

/// Name of the root group
pub const ROOT_GROUP_NAME: &str = "<root>";

/// A node of the report tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultGroup {
    pub name: String,
    pub results: Vec<WatchdogResult>,
    pub groups: Vec<ResultGroup>,
}

impl ResultGroup {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), results: Vec::new(), groups: Vec::new() }
    }

    /// Every result in the tree, parents before children
    pub fn flatten(&self) -> Vec<&WatchdogResult> {
        let mut flat = Vec::new();
        self.walk(&mut |group| flat.extend(group.results.iter()));
        flat
    }

    /// Number of results in this group and all of its descendants
    pub fn total(&self) -> usize {
        self.results.len() + self.groups.iter().map(ResultGroup::total).sum::<usize>()
    }

    /// Number of failed results in this group and all of its descendants
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|result| !result.success).count()
            + self.groups.iter().map(ResultGroup::failures).sum::<usize>()
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ResultGroup)) {
        visit(self);
        for group in &self.groups {
            group.walk(visit);
        }
    }
}

/// Grouping key of a target
fn group_key(target: &str) -> &str {
    target.trim_end_matches('/')
}

/// Whether `parent` is a strict prefix of `child` ending on a path boundary
fn is_path_prefix(parent: &str, child: &str) -> bool {
    child.len() > parent.len()
        && child.starts_with(parent)
        && matches!(child.as_bytes()[parent.len()], b'/' | b'?' | b'#')
}

/// Group a flat list of results into a tree rooted at [`ROOT_GROUP_NAME`]
pub fn collect_results<I>(results: I) -> ResultGroup
where
    I: IntoIterator<Item = WatchdogResult>,
{
    // Distinct keys in first-seen order, with the results aimed at each
    let mut keys: Vec<String> = Vec::new();
    let mut buckets: Vec<Vec<WatchdogResult>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        let key = group_key(&result.target).to_string();
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            buckets.push(Vec::new());
            keys.len() - 1
        });
        buckets[slot].push(result);
    }

    // Parent of each key: the longest other key that is a path prefix of it
    let parents: Vec<Option<usize>> = keys
        .iter()
        .map(|key| {
            keys.iter()
                .enumerate()
                .filter(|(_, candidate)| is_path_prefix(candidate, key))
                .max_by_key(|(_, candidate)| candidate.len())
                .map(|(i, _)| i)
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
    let mut top_level = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => top_level.push(i),
        }
    }

    let mut buckets: Vec<Option<Vec<WatchdogResult>>> = buckets.into_iter().map(Some).collect();
    let mut root = ResultGroup::new(ROOT_GROUP_NAME);
    root.groups = top_level
        .into_iter()
        .map(|i| build_group(i, &keys, &children, &mut buckets))
        .collect();
    root
}

fn build_group(
    i: usize,
    keys: &[String],
    children: &[Vec<usize>],
    buckets: &mut [Option<Vec<WatchdogResult>>],
) -> ResultGroup {
    let mut group = ResultGroup::new(keys[i].clone());
    group.results = buckets[i].take().unwrap_or_default();
    group.groups =
        children[i].iter().map(|&child| build_group(child, keys, children, buckets)).collect();
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn result(name: &str, target: &str) -> WatchdogResult {
        WatchdogResult {
            test_name: name.to_string(),
            target: target.to_string(),
            success: true,
            latency: 0.0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            status: None,
            payload: None,
            response: None,
            results: Vec::new(),
            email_to: Vec::new(),
        }
    }

    fn results(fragments: &[(&str, &str)]) -> Vec<WatchdogResult> {
        fragments.iter().map(|(name, target)| result(name, target)).collect()
    }

    fn names(results: &[WatchdogResult]) -> Vec<&str> {
        results.iter().map(|r| r.test_name.as_str()).collect()
    }

    #[test]
    fn test_collect_empty() {
        let root = collect_results(Vec::new());
        assert_eq!(root.name, ROOT_GROUP_NAME);
        assert!(root.results.is_empty());
        assert!(root.groups.is_empty());
    }

    #[test]
    fn test_collect_groupby_target() {
        let root = collect_results(results(&[
            ("1", "http://a.com/"),
            ("2", "http://a.com/b"),
            ("3", "http://a.com/b"),
            ("4", "http://a.com/c"),
            ("5", "http://a.com/d"),
        ]));

        assert!(root.results.is_empty());
        assert_eq!(root.groups.len(), 1);

        let host = &root.groups[0];
        assert_eq!(host.name, "http://a.com");
        assert_eq!(names(&host.results), vec!["1"]);

        let child_names: Vec<&str> = host.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(child_names, vec!["http://a.com/b", "http://a.com/c", "http://a.com/d"]);
        assert_eq!(names(&host.groups[0].results), vec!["2", "3"]);
        assert_eq!(names(&host.groups[1].results), vec!["4"]);
        assert_eq!(names(&host.groups[2].results), vec!["5"]);
        assert!(host.groups.iter().all(|g| g.groups.is_empty()));
    }

    #[test]
    fn test_collect_groupby_target_without_host_result() {
        let root = collect_results(results(&[
            ("2", "http://a.com/b"),
            ("3", "http://a.com/b"),
            ("4", "http://a.com/c"),
            ("5", "http://a.com/d"),
        ]));

        let top: Vec<&str> = root.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(top, vec!["http://a.com/b", "http://a.com/c", "http://a.com/d"]);
        assert_eq!(names(&root.groups[0].results), vec!["2", "3"]);
    }

    #[test]
    fn test_collect_nests_by_longest_prefix_regardless_of_order() {
        let root = collect_results(results(&[
            ("deep", "http://a.com/b/c/d"),
            ("mid", "http://a.com/b"),
            ("other", "http://b.org/x"),
            ("host", "http://a.com"),
            ("sibling", "http://a.com/bb"),
        ]));

        let top: Vec<&str> = root.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(top, vec!["http://b.org/x", "http://a.com"]);

        let host = &root.groups[1];
        let under_host: Vec<&str> = host.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(under_host, vec!["http://a.com/b", "http://a.com/bb"]);
        assert_eq!(host.groups[0].groups[0].name, "http://a.com/b/c/d");
        assert_eq!(root.total(), 5);
    }

    #[test]
    fn test_collect_is_stable_under_regrouping() {
        let root = collect_results(results(&[
            ("1", "http://a.com/"),
            ("2", "http://a.com/b"),
            ("3", "https://z.io/v1/items"),
            ("4", "http://a.com/b"),
            ("5", "https://z.io/v1/items/7"),
            ("6", "http://a.com/c"),
        ]));

        let flattened: Vec<WatchdogResult> = root.flatten().into_iter().cloned().collect();
        assert_eq!(flattened.len(), 6);
        assert_eq!(collect_results(flattened), root);
    }

    #[test]
    fn test_failure_counts() {
        let mut input = results(&[("1", "http://a.com/"), ("2", "http://a.com/b")]);
        input[1].success = false;
        let root = collect_results(input);
        assert_eq!(root.total(), 2);
        assert_eq!(root.failures(), 1);
    }

    #[test]
    fn test_path_prefix_requires_boundary() {
        assert!(is_path_prefix("http://a.com", "http://a.com/b"));
        assert!(is_path_prefix("http://a.com/b", "http://a.com/b?q=1"));
        assert!(!is_path_prefix("http://a.com/b", "http://a.com/bb"));
        assert!(!is_path_prefix("http://a.com/b", "http://a.com/b"));
    }
}
