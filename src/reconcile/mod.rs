//! Binding model-declared filenames to real package members.
//!
//! Declared names are untrusted. A name is only ever resolved to one of the
//! member paths actually extracted from the package, never used as a path on
//! its own.

use std::path::{Component, Path};

use crate::config::MatchPolicy;
use crate::wire::{MatchKind, ProposedEdit, ResolvedEdit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { member: String, matched_by: MatchKind, ambiguous: bool },
    Unresolved { reason: String },
}

fn basename(p: &str) -> &str {
    p.rsplit('/').next().unwrap_or(p)
}

/// Absolute paths, drive prefixes and `.`/`..`/empty segments are refused.
fn is_safe_relative(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') || name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return false;
    }
    Path::new(name).components().all(|c| matches!(c, Component::Normal(_)))
}

/// Resolve a normalized declared filename against the real member paths.
///
/// Exact match wins; with [`MatchPolicy::Basename`] the final path component is
/// tried next, taking the first member in enumeration order. When more than one
/// member shares that basename the resolution is flagged `ambiguous`.
pub fn resolve(declared: &str, members: &[String], policy: MatchPolicy) -> Resolution {
    // Member names come from the archive itself, `./` prefixes included.
    if members.iter().any(|m| m == declared) {
        return Resolution::Resolved { member: declared.to_string(), matched_by: MatchKind::Exact, ambiguous: false };
    }
    if !is_safe_relative(declared) {
        return Resolution::Unresolved { reason: format!("'{declared}' is not a safe relative member path") };
    }
    if policy == MatchPolicy::Strict {
        return Resolution::Unresolved { reason: format!("'{declared}' is not a member path (strict matching)") };
    }

    let wanted = basename(declared);
    let candidates: Vec<&String> = members.iter().filter(|m| basename(m) == wanted).collect();
    match candidates.as_slice() {
        [] => Resolution::Unresolved { reason: format!("no member path or basename matches '{declared}'") },
        [first, rest @ ..] => {
            if !rest.is_empty() {
                tracing::warn!(
                    "'{declared}' matches several members by basename ({}); using {first}",
                    candidates.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
                );
            }
            Resolution::Resolved {
                member: (*first).clone(),
                matched_by: MatchKind::Basename,
                ambiguous: !rest.is_empty(),
            }
        }
    }
}

/// Edits that resolved, and the declared names that did not.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub resolved: Vec<ResolvedEdit>,
    pub unresolved: Vec<String>,
}

/// Resolve every proposed edit. Unresolved ones are dropped with a warning. If
/// two declared names land on the same member, the later one wins.
pub fn reconcile(proposed: Vec<ProposedEdit>, members: &[String], policy: MatchPolicy) -> Reconciled {
    let mut out = Reconciled::default();
    for edit in proposed {
        match resolve(&edit.declared, members, policy) {
            Resolution::Resolved { member, matched_by, .. } => {
                if matched_by == MatchKind::Basename {
                    tracing::info!("mapped '{}' to {member} by basename", edit.declared);
                }
                let resolved = ResolvedEdit { member, declared: edit.declared, matched_by, content: edit.content };
                match out.resolved.iter_mut().find(|r| r.member == resolved.member) {
                    Some(existing) => {
                        tracing::warn!(
                            "'{}' and '{}' both map to {}; keeping the later block",
                            existing.declared,
                            resolved.declared,
                            resolved.member
                        );
                        *existing = resolved;
                    }
                    None => out.resolved.push(resolved),
                }
            }
            Resolution::Unresolved { reason } => {
                tracing::warn!("dropping edit: {reason}");
                out.unresolved.push(edit.declared);
            }
        }
    }
    out
}
