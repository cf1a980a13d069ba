//! Revision chain: the DAG of revisions linked by `down_revision`
//!
//! The chain is built once from every known step and answers the questions
//! the runner asks before touching a database: which revision is head, what
//! a target spec names, and which steps move the schema from one revision to
//! another.

use crate::migration::{Direction, Migration, MigrationError};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};

/// One step of a resolved plan
#[derive(Clone, Copy)]
pub struct PlannedStep<'a> {
    pub migration: &'a dyn Migration,
    pub direction: Direction,
}

impl PlannedStep<'_> {
    pub fn revision(&self) -> &str {
        self.migration.revision()
    }

    /// Current Revision the database must be at before this step runs
    pub fn expected_current(&self) -> Option<&str> {
        match self.direction {
            Direction::Up => self.migration.down_revision(),
            Direction::Down => Some(self.migration.revision()),
        }
    }

    /// Current Revision once this step has committed
    pub fn resulting_revision(&self) -> Option<&str> {
        match self.direction {
            Direction::Up => Some(self.migration.revision()),
            Direction::Down => self.migration.down_revision(),
        }
    }
}

impl std::fmt::Debug for PlannedStep<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.direction, self.migration.revision())
    }
}

/// The full set of revisions, validated and topologically ordered
pub struct RevisionChain {
    migrations: Vec<Box<dyn Migration>>,
    index: HashMap<String, usize>,
    /// Indices into `migrations`, parents before children
    order: Vec<usize>,
}

impl RevisionChain {
    /// Build and validate a chain
    ///
    /// # Errors
    ///
    /// - `DuplicateRevision` if two steps share an id
    /// - `UnknownRevision` if a `down_revision` or `depends_on` names no step
    /// - `CyclicHistory` if the links loop
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Result<Self, MigrationError> {
        let mut index = HashMap::with_capacity(migrations.len());
        for (i, migration) in migrations.iter().enumerate() {
            if index.insert(migration.revision().to_string(), i).is_some() {
                return Err(MigrationError::DuplicateRevision(
                    migration.revision().to_string(),
                ));
            }
        }

        for migration in &migrations {
            let referenced = migration
                .down_revision()
                .into_iter()
                .chain(migration.depends_on().iter().copied());
            for revision in referenced {
                if !index.contains_key(revision) {
                    return Err(MigrationError::UnknownRevision(revision.to_string()));
                }
            }
        }

        let order = topological_order(&migrations, &index)?;

        Ok(Self {
            migrations,
            index,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn contains(&self, revision: &str) -> bool {
        self.index.contains_key(revision)
    }

    pub fn get(&self, revision: &str) -> Option<&dyn Migration> {
        self.index.get(revision).map(|&i| self.migrations[i].as_ref())
    }

    fn require(&self, revision: &str) -> Result<&dyn Migration, MigrationError> {
        self.get(revision)
            .ok_or_else(|| MigrationError::UnknownRevision(revision.to_string()))
    }

    /// Every revision, base to head (parents always before children)
    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> + '_ {
        self.order.iter().map(|&i| self.migrations[i].as_ref())
    }

    /// Revisions whose `down_revision` is `parent` (`None`: the roots)
    pub fn children(&self, parent: Option<&str>) -> Vec<&dyn Migration> {
        self.iter()
            .filter(|m| m.down_revision() == parent)
            .collect()
    }

    /// `revision` followed by its `down_revision` line back to the root
    ///
    /// # Errors
    ///
    /// `UnknownRevision` if `revision` is not in the chain.
    pub fn ancestors(&self, revision: &str) -> Result<Vec<&dyn Migration>, MigrationError> {
        let mut line = Vec::new();
        let mut cursor = Some(revision);
        while let Some(id) = cursor {
            let migration = self.require(id)?;
            line.push(migration);
            cursor = migration.down_revision();
        }
        Ok(line)
    }

    fn ancestry(&self, revision: Option<&str>) -> Result<Vec<&dyn Migration>, MigrationError> {
        match revision {
            Some(id) => self.ancestors(id),
            None => Ok(Vec::new()),
        }
    }

    /// Whether `ancestor` lies on the `down_revision` line of `descendant`
    /// (a revision is its own ancestor; base is everyone's)
    pub fn is_ancestor_or_self(
        &self,
        ancestor: Option<&str>,
        descendant: Option<&str>,
    ) -> Result<bool, MigrationError> {
        let Some(ancestor) = ancestor else {
            return Ok(true);
        };
        Ok(self
            .ancestry(descendant)?
            .iter()
            .any(|m| m.revision() == ancestor))
    }

    /// Revisions nothing builds on, in chain order
    pub fn heads(&self) -> Vec<&str> {
        let parents: HashSet<&str> = self
            .migrations
            .iter()
            .filter_map(|m| m.down_revision())
            .collect();
        self.iter()
            .map(|m| m.revision())
            .filter(|r| !parents.contains(r))
            .collect()
    }

    /// The single head (`None` for an empty chain)
    ///
    /// # Errors
    ///
    /// `AmbiguousHead` when the history has several tips.
    pub fn head(&self) -> Result<Option<&str>, MigrationError> {
        let heads = self.heads();
        match heads.as_slice() {
            [] => Ok(None),
            [head] => Ok(Some(*head)),
            _ => Err(MigrationError::AmbiguousHead {
                heads: heads.iter().map(|h| h.to_string()).collect(),
            }),
        }
    }

    /// The tip of the branch carrying `label`
    pub fn head_for_label(&self, label: &str) -> Result<&str, MigrationError> {
        let labelled: Vec<&str> = self
            .iter()
            .filter(|m| m.branch_labels().contains(&label))
            .map(|m| m.revision())
            .collect();
        if labelled.is_empty() {
            return Err(MigrationError::UnknownRevision(label.to_string()));
        }

        let mut tips = Vec::new();
        for head in self.heads() {
            for &start in &labelled {
                if self.is_ancestor_or_self(Some(start), Some(head))? {
                    tips.push(head);
                    break;
                }
            }
        }

        match tips.as_slice() {
            [tip] => Ok(*tip),
            _ => Err(MigrationError::AmbiguousHead {
                heads: tips.iter().map(|t| t.to_string()).collect(),
            }),
        }
    }

    /// Resolve a user-supplied target against the chain
    ///
    /// Accepts `head`, `base`, `<label>@head`, a full revision id, a unique
    /// id prefix, and `+N` / `-N` relative to `current`.
    pub fn resolve_target(
        &self,
        spec: &str,
        current: Option<&str>,
    ) -> Result<Option<String>, MigrationError> {
        let spec = spec.trim();
        match spec {
            "head" => return Ok(self.head()?.map(str::to_string)),
            "base" => return Ok(None),
            _ => {}
        }

        if let Some(label) = spec.strip_suffix("@head") {
            return Ok(Some(self.head_for_label(label)?.to_string()));
        }

        let relative = Regex::new(r"^([+-])(\d+)$").map_err(|e| {
            MigrationError::UnknownRevision(format!("{spec} (invalid pattern: {e})"))
        })?;
        if let Some(caps) = relative.captures(spec) {
            let steps: usize = caps[2]
                .parse()
                .map_err(|_| MigrationError::UnknownRevision(spec.to_string()))?;
            return if &caps[1] == "+" {
                self.walk_forward(spec, current, steps)
            } else {
                self.walk_back(spec, current, steps)
            };
        }

        if self.contains(spec) {
            return Ok(Some(spec.to_string()));
        }

        let candidates: Vec<&str> = self
            .iter()
            .map(|m| m.revision())
            .filter(|r| r.starts_with(spec))
            .collect();
        match candidates.as_slice() {
            [] => Err(MigrationError::UnknownRevision(spec.to_string())),
            [only] => Ok(Some(only.to_string())),
            _ => Err(MigrationError::AmbiguousRevision {
                prefix: spec.to_string(),
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    fn walk_forward(
        &self,
        spec: &str,
        current: Option<&str>,
        steps: usize,
    ) -> Result<Option<String>, MigrationError> {
        let mut cursor = current.map(str::to_string);
        for _ in 0..steps {
            let children = self.children(cursor.as_deref());
            cursor = match children.as_slice() {
                [] => {
                    return Err(MigrationError::UnknownRevision(format!(
                        "{spec} (no revision after {})",
                        cursor.as_deref().unwrap_or("base")
                    )))
                }
                [next] => Some(next.revision().to_string()),
                _ => {
                    return Err(MigrationError::AmbiguousHead {
                        heads: children.iter().map(|c| c.revision().to_string()).collect(),
                    })
                }
            };
        }
        Ok(cursor)
    }

    fn walk_back(
        &self,
        spec: &str,
        current: Option<&str>,
        steps: usize,
    ) -> Result<Option<String>, MigrationError> {
        let line = self.ancestry(current)?;
        // line[0] is current; stepping back len times reaches base
        match steps.cmp(&line.len()) {
            std::cmp::Ordering::Less => Ok(Some(line[steps].revision().to_string())),
            std::cmp::Ordering::Equal => Ok(None),
            std::cmp::Ordering::Greater => Err(MigrationError::UnknownRevision(format!(
                "{spec} (only {} revision(s) below {})",
                line.len(),
                current.unwrap_or("base")
            ))),
        }
    }

    /// Steps that move the schema from `from` to `to` (`None` is base)
    ///
    /// Upgrades run oldest first, downgrades newest first. When the two
    /// revisions sit on different branches the plan downgrades to their
    /// closest common ancestor and then upgrades.
    ///
    /// # Errors
    ///
    /// - `UnknownRevision` if either endpoint is not in the chain
    /// - `DisconnectedHistory` if the endpoints share no ancestor
    pub fn resolve_path(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<PlannedStep<'_>>, MigrationError> {
        let from_line = self.ancestry(from)?;
        let to_line = self.ancestry(to)?;

        if from == to {
            return Ok(Vec::new());
        }

        let to_set: HashSet<&str> = to_line.iter().map(|m| m.revision()).collect();
        let common = from_line
            .iter()
            .map(|m| m.revision())
            .find(|r| to_set.contains(r));

        if common.is_none() && from.is_some() && to.is_some() {
            return Err(MigrationError::DisconnectedHistory {
                from: from.map(str::to_string),
                to: to.map(str::to_string),
            });
        }

        let mut plan: Vec<PlannedStep<'_>> = from_line
            .iter()
            .take_while(|m| Some(m.revision()) != common)
            .map(|&migration| PlannedStep {
                migration,
                direction: Direction::Down,
            })
            .collect();

        let mut upgrades: Vec<PlannedStep<'_>> = to_line
            .iter()
            .take_while(|m| Some(m.revision()) != common)
            .map(|&migration| PlannedStep {
                migration,
                direction: Direction::Up,
            })
            .collect();
        upgrades.reverse();
        plan.extend(upgrades);

        Ok(plan)
    }
}

impl std::fmt::Debug for RevisionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|m| m.revision()))
            .finish()
    }
}

/// Kahn's algorithm over `down_revision` and `depends_on` edges
fn topological_order(
    migrations: &[Box<dyn Migration>],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>, MigrationError> {
    let mut in_degree = vec![0usize; migrations.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); migrations.len()];

    for (i, migration) in migrations.iter().enumerate() {
        let prerequisites = migration
            .down_revision()
            .into_iter()
            .chain(migration.depends_on().iter().copied());
        for prerequisite in prerequisites {
            if let Some(&p) = index.get(prerequisite) {
                dependents[p].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..migrations.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(migrations.len());

    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &dependent in &dependents[current] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != migrations.len() {
        let stuck = (0..migrations.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| migrations[i].revision())
            .min()
            .unwrap_or_default();
        return Err(MigrationError::CyclicHistory(stuck.to_string()));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DbError;
    use crate::migration::SchemaManager;

    struct Node {
        revision: &'static str,
        down: Option<&'static str>,
        labels: &'static [&'static str],
        depends: &'static [&'static str],
    }

    impl Migration for Node {
        fn revision(&self) -> &str {
            self.revision
        }
        fn down_revision(&self) -> Option<&str> {
            self.down
        }
        fn branch_labels(&self) -> &[&str] {
            self.labels
        }
        fn depends_on(&self) -> &[&str] {
            self.depends
        }
        fn description(&self) -> &str {
            "test node"
        }
        fn up(&self, _manager: &SchemaManager<'_>) -> Result<(), DbError> {
            Ok(())
        }
        fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), DbError> {
            Ok(())
        }
    }

    fn node(revision: &'static str, down: Option<&'static str>) -> Box<dyn Migration> {
        Box::new(Node {
            revision,
            down,
            labels: &[],
            depends: &[],
        })
    }

    fn linear() -> RevisionChain {
        RevisionChain::new(vec![
            node("aaa111", None),
            node("bbb222", Some("aaa111")),
            node("ccc333", Some("bbb222")),
        ])
        .unwrap()
    }

    /// aaa111 -> bbb222 -> ccc333
    ///               \--> ddd444 (label "notes")
    fn branched() -> RevisionChain {
        RevisionChain::new(vec![
            node("aaa111", None),
            node("bbb222", Some("aaa111")),
            node("ccc333", Some("bbb222")),
            Box::new(Node {
                revision: "ddd444",
                down: Some("bbb222"),
                labels: &["notes"],
                depends: &[],
            }),
        ])
        .unwrap()
    }

    fn steps(plan: &[PlannedStep<'_>]) -> Vec<String> {
        plan.iter().map(|s| format!("{:?}", s)).collect()
    }

    #[test]
    fn test_iter_is_base_to_head() {
        let chain = RevisionChain::new(vec![
            node("ccc333", Some("bbb222")),
            node("aaa111", None),
            node("bbb222", Some("aaa111")),
        ])
        .unwrap();
        let order: Vec<&str> = chain.iter().map(|m| m.revision()).collect();
        assert_eq!(order, vec!["aaa111", "bbb222", "ccc333"]);
        assert_eq!(chain.head().unwrap(), Some("ccc333"));
    }

    #[test]
    fn test_duplicate_revision_rejected() {
        let err = RevisionChain::new(vec![node("aaa111", None), node("aaa111", None)]).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateRevision(r) if r == "aaa111"));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let err = RevisionChain::new(vec![node("bbb222", Some("missing"))]).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownRevision(r) if r == "missing"));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = RevisionChain::new(vec![
            node("aaa111", Some("bbb222")),
            node("bbb222", Some("aaa111")),
        ])
        .unwrap_err();
        assert!(matches!(err, MigrationError::CyclicHistory(_)));
    }

    #[test]
    fn test_upgrade_path_oldest_first() {
        let chain = linear();
        let plan = chain.resolve_path(None, Some("ccc333")).unwrap();
        assert_eq!(steps(&plan), vec!["upgrade aaa111", "upgrade bbb222", "upgrade ccc333"]);
        assert_eq!(plan[0].expected_current(), None);
        assert_eq!(plan[2].resulting_revision(), Some("ccc333"));
    }

    #[test]
    fn test_downgrade_path_newest_first() {
        let chain = linear();
        let plan = chain.resolve_path(Some("ccc333"), Some("aaa111")).unwrap();
        assert_eq!(steps(&plan), vec!["downgrade ccc333", "downgrade bbb222"]);
        assert_eq!(plan[0].expected_current(), Some("ccc333"));
        assert_eq!(plan[1].resulting_revision(), Some("aaa111"));

        let to_base = chain.resolve_path(Some("bbb222"), None).unwrap();
        assert_eq!(steps(&to_base), vec!["downgrade bbb222", "downgrade aaa111"]);
    }

    #[test]
    fn test_same_revision_is_empty_plan() {
        let chain = linear();
        assert!(chain.resolve_path(Some("bbb222"), Some("bbb222")).unwrap().is_empty());
        assert!(chain.resolve_path(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_endpoint() {
        let chain = linear();
        let err = chain.resolve_path(Some("zzz999"), None).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownRevision(r) if r == "zzz999"));
    }

    #[test]
    fn test_cross_branch_path_goes_through_common_ancestor() {
        let chain = branched();
        let plan = chain.resolve_path(Some("ccc333"), Some("ddd444")).unwrap();
        assert_eq!(steps(&plan), vec!["downgrade ccc333", "upgrade ddd444"]);
    }

    #[test]
    fn test_branch_heads() {
        let chain = branched();
        assert_eq!(chain.heads(), vec!["ccc333", "ddd444"]);
        let err = chain.head().unwrap_err();
        assert!(matches!(err, MigrationError::AmbiguousHead { heads } if heads.len() == 2));
        assert_eq!(chain.head_for_label("notes").unwrap(), "ddd444");
        assert_eq!(chain.resolve_target("notes@head", None).unwrap().as_deref(), Some("ddd444"));
        assert!(matches!(
            chain.head_for_label("nope"),
            Err(MigrationError::UnknownRevision(_))
        ));
    }

    #[test]
    fn test_disconnected_roots() {
        let chain = RevisionChain::new(vec![node("aaa111", None), node("fff000", None)]).unwrap();
        let err = chain.resolve_path(Some("aaa111"), Some("fff000")).unwrap_err();
        assert!(matches!(err, MigrationError::DisconnectedHistory { .. }));
        // base reaches either root
        assert_eq!(chain.resolve_path(None, Some("fff000")).unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_target_keywords_and_prefixes() {
        let chain = linear();
        assert_eq!(chain.resolve_target("head", None).unwrap().as_deref(), Some("ccc333"));
        assert_eq!(chain.resolve_target("base", Some("ccc333")).unwrap(), None);
        assert_eq!(chain.resolve_target("bbb222", None).unwrap().as_deref(), Some("bbb222"));
        assert_eq!(chain.resolve_target("bb", None).unwrap().as_deref(), Some("bbb222"));
        assert!(matches!(
            chain.resolve_target("zz", None),
            Err(MigrationError::UnknownRevision(_))
        ));

        let similar =
            RevisionChain::new(vec![node("abc111", None), node("abc222", Some("abc111"))]).unwrap();
        let err = similar.resolve_target("abc", None).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::AmbiguousRevision { candidates, .. } if candidates.len() == 2
        ));
    }

    #[test]
    fn test_resolve_relative_targets() {
        let chain = linear();
        assert_eq!(chain.resolve_target("+1", None).unwrap().as_deref(), Some("aaa111"));
        assert_eq!(chain.resolve_target("+2", Some("aaa111")).unwrap().as_deref(), Some("ccc333"));
        assert_eq!(chain.resolve_target("-1", Some("ccc333")).unwrap().as_deref(), Some("bbb222"));
        assert_eq!(chain.resolve_target("-3", Some("ccc333")).unwrap(), None);
        assert!(chain.resolve_target("-4", Some("ccc333")).is_err());
        assert!(chain.resolve_target("+1", Some("ccc333")).is_err());
    }

    #[test]
    fn test_depends_on_orders_after_dependency() {
        let chain = RevisionChain::new(vec![
            Box::new(Node {
                revision: "eee555",
                down: None,
                labels: &[],
                depends: &["aaa111"],
            }) as Box<dyn Migration>,
            node("aaa111", None),
        ])
        .unwrap();
        let order: Vec<&str> = chain.iter().map(|m| m.revision()).collect();
        assert_eq!(order, vec!["aaa111", "eee555"]);

        let err = RevisionChain::new(vec![Box::new(Node {
            revision: "eee555",
            down: None,
            labels: &[],
            depends: &["missing"],
        }) as Box<dyn Migration>])
        .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownRevision(_)));
    }
}
