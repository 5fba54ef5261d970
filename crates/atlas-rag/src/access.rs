//! Tag-based access resolution
//!
//! A user's effective read set is the reflexive-transitive closure of their
//! declared tags over the parent relation. The closure is computed from one
//! list-all-tags snapshot so resolution never loops over the database.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::Result;
use crate::storage::MetaStore;
use crate::types::{OrganizationTag, User};

/// Computes effective tag sets for retrieval filtering
pub struct AccessResolver {
    meta: Arc<MetaStore>,
}

impl AccessResolver {
    pub fn new(meta: Arc<MetaStore>) -> Self {
        Self { meta }
    }

    /// Tags the user may read from: declared tags plus every ancestor
    pub fn resolve(&self, user: &User) -> Result<Vec<String>> {
        if user.org_tags.is_empty() {
            return Ok(Vec::new());
        }
        let all_tags = self.meta.list_tags()?;
        Ok(tag_closure(&user.org_tags, &all_tags))
    }
}

/// Walk parent edges breadth-first from the declared tags. The store does not
/// enforce acyclicity, so traversal is bounded by the visited set and by the
/// total node count.
pub fn tag_closure(declared: &[String], all_tags: &[OrganizationTag]) -> Vec<String> {
    let parent_map: HashMap<&str, Option<&str>> = all_tags
        .iter()
        .map(|tag| (tag.tag_id.as_str(), tag.parent_tag.as_deref()))
        .collect();

    let mut effective: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for tag in declared {
        if seen.insert(tag.clone()) {
            effective.push(tag.clone());
            queue.push_back(tag.clone());
        }
    }

    let mut budget = all_tags.len() + declared.len();
    while let Some(current) = queue.pop_front() {
        if budget == 0 {
            tracing::warn!("tag traversal budget exhausted, possible cycle in tag forest");
            break;
        }
        budget -= 1;

        if let Some(Some(parent)) = parent_map.get(current.as_str()) {
            if seen.insert((*parent).to_string()) {
                effective.push((*parent).to_string());
                queue.push_back((*parent).to_string());
            }
        }
    }

    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tag(id: &str, parent: Option<&str>) -> OrganizationTag {
        OrganizationTag {
            tag_id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            parent_tag: parent.map(|p| p.to_string()),
            created_by: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn closure_includes_all_ancestors() {
        let tags = vec![
            tag("root", None),
            tag("dept", Some("root")),
            tag("team", Some("dept")),
            tag("other", None),
        ];
        let effective = tag_closure(&["team".to_string()], &tags);
        assert_eq!(effective, vec!["team", "dept", "root"]);
    }

    #[test]
    fn closure_is_reflexive_and_deduplicated() {
        let tags = vec![tag("root", None), tag("a", Some("root")), tag("b", Some("root"))];
        let declared = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let effective = tag_closure(&declared, &tags);
        assert_eq!(effective, vec!["a", "b", "root"]);
    }

    #[test]
    fn cycle_does_not_hang_traversal() {
        // parent edges form a loop; forbidden by invariant but defended against
        let tags = vec![tag("x", Some("y")), tag("y", Some("x"))];
        let effective = tag_closure(&["x".to_string()], &tags);
        assert!(effective.contains(&"x".to_string()));
        assert!(effective.contains(&"y".to_string()));
        assert_eq!(effective.len(), 2);
    }

    #[test]
    fn declared_tag_missing_from_forest_is_kept() {
        let tags = vec![tag("root", None)];
        let effective = tag_closure(&["PRIVATE_alice".to_string()], &tags);
        assert_eq!(effective, vec!["PRIVATE_alice"]);
    }
}
