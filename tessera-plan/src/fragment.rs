use crate::error::{Error, Result};
use crate::json::FragmentDoc;
use crate::node::{NodeKind, PlanNode, PlanNodeId, SchemaColumn};
use fnv::FnvHashSet;
use indexmap::IndexMap;

/// PlanFragment is the unit of work shipped by the host: a tree of
/// plan nodes and the order in which they run.
///
/// The execution order always lists children before their parent,
/// and the last node is the root whose output is the fragment result.
#[derive(Debug, Clone)]
pub struct PlanFragment {
    nodes: IndexMap<PlanNodeId, PlanNode>,
    execute_list: Vec<PlanNodeId>,
}

impl PlanFragment {
    /// Parses a fragment document. Without an explicit execute list,
    /// the first node is taken as root and nodes run in post-order.
    pub fn from_json(s: &str) -> Result<Self> {
        let doc: FragmentDoc = serde_json::from_str(s)?;
        let nodes = doc
            .nodes
            .into_iter()
            .map(PlanNode::try_from)
            .collect::<Result<Vec<_>>>()?;
        let fragment = PlanFragment::new(nodes, doc.execute_list)?;
        log::debug!(
            "loaded plan fragment of {} nodes, root {}",
            fragment.nodes.len(),
            fragment.root().id
        );
        Ok(fragment)
    }

    pub fn new(nodes: Vec<PlanNode>, execute_list: Option<Vec<PlanNodeId>>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::EmptyFragment);
        }
        let first = nodes[0].id;
        let mut map = IndexMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id;
            if map.insert(id, node).is_some() {
                return Err(Error::invalid(id, "duplicated node id"));
            }
        }
        for node in map.values() {
            for child in &node.children {
                if !map.contains_key(child) {
                    return Err(Error::NodeNotFound(*child));
                }
            }
            validate_shape(node)?;
        }
        let execute_list = match execute_list {
            Some(list) => list,
            None => {
                let mut list = Vec::with_capacity(map.len());
                let mut visiting = FnvHashSet::default();
                post_order(&map, first, &mut visiting, &mut list)?;
                list
            }
        };
        let fragment = PlanFragment {
            nodes: map,
            execute_list,
        };
        fragment.validate_execute_list()?;
        Ok(fragment)
    }

    #[inline]
    pub fn node(&self, id: PlanNodeId) -> Option<&PlanNode> {
        self.nodes.get(&id)
    }

    #[inline]
    pub fn nodes(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.values()
    }

    #[inline]
    pub fn execute_list(&self) -> &[PlanNodeId] {
        &self.execute_list
    }

    #[inline]
    pub fn root(&self) -> &PlanNode {
        // execute list is validated non-empty and every id exists
        &self.nodes[self.execute_list.last().unwrap_or(&self.nodes[0].id)]
    }

    /// Output schema of given node. A node without its own schema
    /// takes the one of its inline projection, otherwise the one of
    /// its first child, recursively.
    pub fn output_schema(&self, id: PlanNodeId) -> Result<&[SchemaColumn]> {
        let mut curr = id;
        loop {
            let node = self.nodes.get(&curr).ok_or(Error::NodeNotFound(curr))?;
            if let Some(cols) = &node.inline_projection {
                return Ok(cols);
            }
            if let Some(cols) = &node.output_schema {
                return Ok(cols);
            }
            match node.children.first() {
                Some(child) => curr = *child,
                None => return Err(Error::NoOutputSchema(id)),
            }
        }
    }

    fn validate_execute_list(&self) -> Result<()> {
        if self.execute_list.is_empty() {
            return Err(Error::EmptyFragment);
        }
        let mut done = FnvHashSet::default();
        for id in &self.execute_list {
            let node = self.nodes.get(id).ok_or(Error::NodeNotFound(*id))?;
            if let Some(child) = node.children.iter().find(|c| !done.contains(*c)) {
                return Err(Error::invalid(
                    *id,
                    format!("child {} does not run before its parent", child),
                ));
            }
            if !done.insert(*id) {
                return Err(Error::invalid(*id, "node listed twice in execute list"));
            }
        }
        Ok(())
    }
}

fn post_order(
    nodes: &IndexMap<PlanNodeId, PlanNode>,
    id: PlanNodeId,
    visiting: &mut FnvHashSet<PlanNodeId>,
    res: &mut Vec<PlanNodeId>,
) -> Result<()> {
    if !visiting.insert(id) {
        return Err(Error::invalid(id, "plan nodes form a cycle"));
    }
    let node = nodes.get(&id).ok_or(Error::NodeNotFound(id))?;
    for child in &node.children {
        post_order(nodes, *child, visiting, res)?;
    }
    res.push(id);
    Ok(())
}

/// Checks child count of each node type.
fn validate_shape(node: &PlanNode) -> Result<()> {
    let n = node.children.len();
    let expected = match &node.kind {
        NodeKind::SeqScan(scan) if scan.is_subquery() => Some(1),
        NodeKind::SeqScan(_)
        | NodeKind::IndexScan(_)
        | NodeKind::IndexCount(_)
        | NodeKind::Receive
        | NodeKind::Materialize(_) => Some(0),
        NodeKind::TableCount(tc) if tc.target_table.is_none() => Some(1),
        NodeKind::TableCount(_) => Some(0),
        NodeKind::NestLoop(_) => Some(2),
        NodeKind::NestLoopIndex(_)
        | NodeKind::Aggregate(_)
        | NodeKind::HashAggregate(_)
        | NodeKind::OrderBy(_)
        | NodeKind::Limit(_)
        | NodeKind::Insert(_)
        | NodeKind::Update(_)
        | NodeKind::Send => Some(1),
        NodeKind::Delete(d) if d.truncate => None,
        NodeKind::Delete(_) => Some(1),
        NodeKind::Projection => None,
        NodeKind::Union(_) => {
            if n == 0 {
                return Err(Error::invalid(node.id, "union without input"));
            }
            None
        }
    };
    match expected {
        Some(e) if e != n => Err(Error::invalid(
            node.id,
            format!(
                "{} expects {} children but has {}",
                node.node_type().name(),
                e,
                n
            ),
        )),
        _ => Ok(()),
    }
}
