//! Candidate repository discovery
//!
//! Turns a tag history into an ordered list of remote repositories that
//! might hold a digest. Pure functions, no I/O.

use std::collections::{BTreeMap, HashSet};

use registry_core::{DockerImageReference, TagHistory};

/// Where and how to contact one candidate remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullthroughSpec {
    /// The candidate repository, stripped to its repository form.
    pub reference: DockerImageReference,

    /// Whether the candidate's registry host may be contacted over
    /// insecure transport.
    pub insecure: bool,
}

/// Identify the remote repositories a digest search should probe, and
/// in what order.
///
/// With `primary` set, only each tag's newest location is considered;
/// otherwise only the older locations are. Locations on one of
/// `local_registry_hosts` are self-references and skipped. A tag whose
/// import policy is insecure (or `insecure_by_default`) marks its
/// registry host insecure for every candidate on that host in this
/// resolution. When several tags name the same repository, the last
/// writer wins.
///
/// The returned names are ordered secure before insecure, then lexically
/// by repository name, then by full reference as a final tie-break; this
/// is the search priority, so secure repositories are probed first.
pub fn identify_candidate_repositories(
    history: &TagHistory,
    local_registry_hosts: &[String],
    primary: bool,
    insecure_by_default: bool,
) -> (Vec<String>, BTreeMap<String, PullthroughSpec>) {
    let mut insecure_hosts: HashSet<String> = HashSet::new();
    let mut candidates: BTreeMap<String, DockerImageReference> = BTreeMap::new();

    for (tag, entry) in &history.tags {
        let tag_insecure = insecure_by_default || entry.insecure;

        let items = if primary {
            entry.items.get(..1).unwrap_or_default()
        } else {
            entry.items.get(1..).unwrap_or_default()
        };

        for item in items {
            let reference = match DockerImageReference::parse(&item.reference) {
                Ok(reference) => reference,
                Err(error) => {
                    tracing::warn!(%tag, reference = %item.reference, %error,
                        "skipping malformed tag history reference");
                    continue;
                }
            };
            let Some(registry) = reference.registry().map(str::to_string) else {
                continue;
            };
            if local_registry_hosts.iter().any(|host| *host == registry) {
                continue;
            }
            if tag_insecure {
                insecure_hosts.insert(registry);
            }
            let repository = reference.as_repository();
            candidates.insert(repository.exact(), repository);
        }
    }

    let mut specs = BTreeMap::new();
    let mut ordered: Vec<(bool, String, String)> = Vec::new();
    for (name, reference) in candidates {
        let insecure = insecure_by_default
            || reference
                .registry()
                .is_some_and(|registry| insecure_hosts.contains(registry));
        ordered.push((insecure, name.clone(), reference.exact()));
        specs.insert(name, PullthroughSpec { reference, insecure });
    }
    ordered.sort();

    (
        ordered.into_iter().map(|(_, name, _)| name).collect(),
        specs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::{TagEntry, TagEvent};

    fn history(tags: &[(&str, bool, &[&str])]) -> TagHistory {
        let mut history = TagHistory::default();
        for (tag, insecure, items) in tags {
            history.tags.insert(
                tag.to_string(),
                TagEntry {
                    insecure: *insecure,
                    items: items
                        .iter()
                        .map(|reference| TagEvent {
                            reference: reference.to_string(),
                        })
                        .collect(),
                },
            );
        }
        history
    }

    #[test]
    fn secure_candidates_sort_first() {
        // Scenario 9: one insecure and one secure host.
        let history = history(&[
            ("t1", true, &["insecure.example.com/user/x:latest"]),
            ("t2", false, &["secure.example.com/user/y:latest"]),
        ]);

        let (ordered, specs) = identify_candidate_repositories(&history, &[], true, false);

        assert_eq!(
            ordered,
            vec![
                "secure.example.com/user/y".to_string(),
                "insecure.example.com/user/x".to_string(),
            ]
        );
        assert!(!specs["secure.example.com/user/y"].insecure);
        assert!(specs["insecure.example.com/user/x"].insecure);
    }

    #[test]
    fn insecure_flag_propagates_to_host() {
        // t1 marks the host insecure; t2's candidate on the same host
        // inherits it even though t2 itself is secure.
        let history = history(&[
            ("t1", true, &["shared.example.com/user/x:latest"]),
            ("t2", false, &["shared.example.com/user/y:latest"]),
        ]);

        let (_, specs) = identify_candidate_repositories(&history, &[], true, false);

        assert!(specs["shared.example.com/user/x"].insecure);
        assert!(specs["shared.example.com/user/y"].insecure);
    }

    #[test]
    fn local_registry_is_excluded() {
        let history = history(&[
            ("latest", false, &["registry.local:5000/user/app:latest"]),
            ("stable", false, &["remote.example.com/user/app:stable"]),
        ]);

        let (ordered, specs) = identify_candidate_repositories(
            &history,
            &["registry.local:5000".to_string()],
            true,
            false,
        );

        assert_eq!(ordered, vec!["remote.example.com/user/app".to_string()]);
        assert_eq!(specs.len(), 1);
    }

    #[test]
    fn primary_takes_newest_secondary_takes_rest() {
        let history = history(&[(
            "latest",
            false,
            &[
                "new.example.com/user/app:latest",
                "old.example.com/user/app:latest",
                "older.example.com/user/app:latest",
            ],
        )]);

        let (primary, _) = identify_candidate_repositories(&history, &[], true, false);
        assert_eq!(primary, vec!["new.example.com/user/app".to_string()]);

        let (secondary, _) = identify_candidate_repositories(&history, &[], false, false);
        assert_eq!(
            secondary,
            vec![
                "old.example.com/user/app".to_string(),
                "older.example.com/user/app".to_string(),
            ]
        );
    }

    #[test]
    fn duplicate_repository_last_writer_wins() {
        let history = history(&[
            ("t1", false, &["remote.example.com/user/app:v1"]),
            ("t2", false, &["remote.example.com/user/app:v2"]),
        ]);

        let (ordered, specs) = identify_candidate_repositories(&history, &[], true, false);

        assert_eq!(ordered.len(), 1);
        assert_eq!(
            specs["remote.example.com/user/app"].reference.exact(),
            "remote.example.com/user/app"
        );
    }

    #[test]
    fn ordering_is_stable_across_tag_permutations() {
        // Property 4: the same candidates in either tag order yield the
        // same search order.
        let forward = history(&[
            ("a", true, &["one.example.com/user/x:latest"]),
            ("b", false, &["two.example.com/user/y:latest"]),
        ]);
        let backward = history(&[
            ("b", false, &["two.example.com/user/y:latest"]),
            ("a", true, &["one.example.com/user/x:latest"]),
        ]);

        let (first, _) = identify_candidate_repositories(&forward, &[], true, false);
        let (second, _) = identify_candidate_repositories(&backward, &[], true, false);

        assert_eq!(first, second);
        assert_eq!(first[0], "two.example.com/user/y");
    }

    #[test]
    fn insecure_by_default_marks_everything() {
        let history = history(&[("latest", false, &["remote.example.com/user/app:latest"])]);

        let (_, specs) = identify_candidate_repositories(&history, &[], true, true);

        assert!(specs["remote.example.com/user/app"].insecure);
    }

    #[test]
    fn malformed_references_are_skipped() {
        let history = history(&[(
            "latest",
            false,
            &["remote.example.com//bad", "remote.example.com/user/app:latest"],
        )]);

        let (ordered, _) = identify_candidate_repositories(&history, &[], false, false);

        // Only the well-formed secondary entry survives.
        assert_eq!(ordered, vec!["remote.example.com/user/app".to_string()]);
    }

    #[test]
    fn registryless_references_are_skipped() {
        let history = history(&[("latest", false, &["user/app:latest"])]);
        let (ordered, specs) = identify_candidate_repositories(&history, &[], true, false);
        assert!(ordered.is_empty());
        assert!(specs.is_empty());
    }
}
