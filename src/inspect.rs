//! Metadata-only traversal of an LH5 file.
//!
//! Nothing here decodes chunks. Nodes whose metadata cannot be read are
//! reported as `<unreadable>` instead of aborting the traversal.

use std::fmt;

use log::warn;

use crate::datatype::decode_datatype;
use crate::file::Lh5File;
use crate::metadata::{Attributes, Compression, DATATYPE_ATTR, NodeMetadata};
use crate::storage::{Lh5Backend, base_name, join_path, normalize_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Dataset,
}

/// Problems found while inspecting a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Metadata missing or unparseable; carries the reason.
    Unreadable(String),
    /// Flagged as not completely written.
    Incomplete,
    /// Declared fields with no stored node.
    MissingFields(Vec<String>),
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Unreadable(_) => write!(f, "<unreadable>"),
            Annotation::Incomplete | Annotation::MissingFields(_) => write!(f, "<incomplete>"),
        }
    }
}

/// Description of one node and, within the depth limit, its children.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub name: String,
    pub path: String,
    /// `None` if the node is unreadable.
    pub kind: Option<NodeKind>,
    /// Datatype descriptor; `None` for plain groups.
    pub datatype: Option<String>,
    pub shape: Option<Vec<u64>>,
    pub element_type: Option<String>,
    pub compression: Option<Compression>,
    /// User attributes, without the datatype.
    pub attributes: Attributes,
    pub annotation: Option<Annotation>,
    pub children: Vec<NodeSummary>,
}

impl NodeSummary {
    fn new(path: &str) -> Self {
        let name = if path.is_empty() {
            "/".to_owned()
        } else {
            base_name(path).to_owned()
        };
        Self {
            name,
            path: path.to_owned(),
            kind: None,
            datatype: None,
            shape: None,
            element_type: None,
            compression: None,
            attributes: Attributes::new(),
            annotation: None,
            children: Vec::new(),
        }
    }

    /// Depth-first search for the node at `path`.
    pub fn find(&self, path: &str) -> Option<&NodeSummary> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// All annotated nodes, depth first.
    pub fn annotated(&self) -> Vec<&NodeSummary> {
        let mut out = Vec::new();
        self.collect_annotated(&mut out);
        out
    }

    fn collect_annotated<'a>(&'a self, out: &mut Vec<&'a NodeSummary>) {
        if self.annotation.is_some() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_annotated(out);
        }
    }

    /// Tree rendering, optionally listing attributes under each node.
    pub fn display(&self, attributes: bool) -> SummaryDisplay<'_> {
        SummaryDisplay {
            node: self,
            attributes,
        }
    }

    fn describe(&self) -> String {
        let mut out = self.name.clone();
        match (&self.kind, &self.datatype) {
            (_, Some(dt)) => out.push_str(&format!(" · {dt}")),
            (Some(NodeKind::Group), None) => out.push_str(" · group"),
            (Some(NodeKind::Dataset), None) => out.push_str(" · dataset"),
            (None, None) => {}
        }
        if let (Some(element), Some(shape)) = (&self.element_type, &self.shape) {
            out.push_str(&format!(" · {element}{shape:?}"));
        }
        match self.compression {
            Some(Compression::Gzip { level }) => out.push_str(&format!(" · gzip({level})")),
            Some(Compression::Bzip2 { block_size }) => {
                out.push_str(&format!(" · bzip2({block_size})"))
            }
            _ => {}
        }
        if let Some(annotation) = &self.annotation {
            out.push_str(&format!(" {annotation}"));
        }
        out
    }
}

/// Renders a [`NodeSummary`] as an indented tree.
pub struct SummaryDisplay<'a> {
    node: &'a NodeSummary,
    attributes: bool,
}

impl SummaryDisplay<'_> {
    fn write_children(
        &self,
        f: &mut fmt::Formatter<'_>,
        node: &NodeSummary,
        prefix: &str,
    ) -> fmt::Result {
        if self.attributes {
            let bar = if node.children.is_empty() { " " } else { "│" };
            for (key, value) in &node.attributes {
                writeln!(f, "{prefix}{bar}   @{key} = {value}")?;
            }
        }
        let n = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            let last = i + 1 == n;
            let branch = if last { "└── " } else { "├── " };
            writeln!(f, "{prefix}{branch}{}", child.describe())?;
            let indent = if last { "    " } else { "│   " };
            self.write_children(f, child, &format!("{prefix}{indent}"))?;
        }
        Ok(())
    }
}

impl fmt::Display for SummaryDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.node.describe())?;
        self.write_children(f, self.node, "")
    }
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display(false).fmt(f)
    }
}

fn summarize_children(
    backend: &Lh5Backend,
    summary: &mut NodeSummary,
    names: &[String],
    depth: Option<usize>,
) {
    summary.children = names
        .iter()
        .map(|name| summarize(backend, &join_path(&summary.path, name), depth.map(|d| d - 1)))
        .collect();
}

/// Declared children of an LH5 group object that are not stored.
fn missing_children(datatype: &str, names: &[String]) -> crate::Result<Vec<String>> {
    Ok(decode_datatype(datatype)?
        .required_children()
        .into_iter()
        .filter(|field| !names.iter().any(|n| n == field))
        .collect())
}

fn summarize(backend: &Lh5Backend, path: &str, depth: Option<usize>) -> NodeSummary {
    let mut summary = NodeSummary::new(path);
    let meta = match backend.get_metadata(path) {
        Ok(Some(meta)) => Some(meta),
        Ok(None) => {
            warn!("'{path}' has no metadata");
            summary.annotation = Some(Annotation::Unreadable("missing metadata".into()));
            None
        }
        Err(e) => {
            warn!("cannot read metadata of '{path}': {e}");
            summary.annotation = Some(Annotation::Unreadable(e.to_string()));
            None
        }
    };
    let Some(meta) = meta else {
        // an unreadable node may still hold readable objects
        if depth != Some(0) {
            match backend.list_stored_children(path) {
                Ok(names) => summarize_children(backend, &mut summary, &names, depth),
                Err(e) => warn!("cannot list children of '{path}': {e}"),
            }
        }
        return summary;
    };
    if meta.is_incomplete() {
        summary.annotation = Some(Annotation::Incomplete);
    }
    summary.datatype = meta.datatype().map(str::to_owned);
    match meta {
        NodeMetadata::Dataset(d) => {
            summary.kind = Some(NodeKind::Dataset);
            summary.shape = Some(d.dimensions);
            summary.element_type = Some(d.data_type);
            summary.compression = Some(d.compression);
            summary.attributes = d.attributes;
        }
        NodeMetadata::Group(g) => {
            summary.kind = Some(NodeKind::Group);
            summary.attributes = g.attributes;
            match backend.list_children(path) {
                Ok(names) => {
                    if let Some(datatype) = &summary.datatype {
                        match missing_children(datatype, &names) {
                            Ok(missing) if !missing.is_empty() => {
                                warn!("'{path}' is missing {missing:?}");
                                summary.annotation.get_or_insert(Annotation::MissingFields(missing));
                            }
                            Ok(_) => {}
                            Err(e) => {
                                summary.annotation = Some(Annotation::Unreadable(e.to_string()));
                            }
                        }
                    }
                    if depth != Some(0) {
                        summarize_children(backend, &mut summary, &names, depth);
                    }
                }
                Err(e) => {
                    warn!("cannot list children of '{path}': {e}");
                    summary.annotation = Some(Annotation::Unreadable(e.to_string()));
                }
            }
        }
    }
    summary.attributes.remove(DATATYPE_ATTR);
    summary
}

/// Summarise the node at `path` and its descendants up to `max_depth` levels
/// below it (unlimited if `None`).
///
/// Fails only if `path` does not exist.
pub fn inspect(file: &Lh5File, path: &str, max_depth: Option<usize>) -> crate::Result<NodeSummary> {
    let path = normalize_path(path)?;
    if !file.backend().exists(&path)? {
        return Err(crate::Error::NotFound(path));
    }
    Ok(summarize(file.backend(), &path, max_depth))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use zarrs::storage::{StoreKey, WritableStorageTraits};

    use super::*;
    use crate::object::{Array, Lh5Object, Table};
    use crate::write::WriteOptions;

    fn sample() -> Lh5File {
        let mut f = Lh5File::in_memory().unwrap();
        let t: Lh5Object = Table::from_fields([
            ("energy", Array::new(vec![1.0f64, 2.0]).with_units("keV")),
            ("flag", Array::new(vec![0u8, 1])),
        ])
        .unwrap()
        .into();
        f.write(&t, "hit", &WriteOptions::default().in_group("ch1"))
            .unwrap();
        f
    }

    #[test]
    fn test_tree() {
        let f = sample();
        let s = inspect(&f, "", None).unwrap();
        let energy = s.find("ch1/hit/energy").unwrap();
        assert_eq!(energy.kind, Some(NodeKind::Dataset));
        assert_eq!(energy.shape, Some(vec![2]));
        assert_eq!(energy.element_type.as_deref(), Some("float64"));
        assert_eq!(energy.datatype.as_deref(), Some("array<1>{real}"));
        assert_eq!(energy.attributes.get("units"), Some(&"keV".into()));
        assert!(s.annotated().is_empty());

        let rendered = s.display(true).to_string();
        assert!(rendered.starts_with("/ · group\n"));
        assert!(rendered.contains("└── hit · table{energy,flag}"));
        assert!(rendered.contains("@units = \"keV\""));
    }

    #[test]
    fn test_depth_limit() {
        let f = sample();
        let s = inspect(&f, "ch1", Some(1)).unwrap();
        assert_eq!(s.children.len(), 1);
        assert!(s.children[0].children.is_empty());
        assert!(matches!(
            inspect(&f, "nope", None),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_node_is_annotated() {
        let f = sample();
        f.backend()
            .storage()
            .set(
                &StoreKey::new("ch1/hit/flag/attributes.json").unwrap(),
                Bytes::from_static(b"{not json"),
            )
            .unwrap();
        let s = inspect(&f, "", None).unwrap();
        let flag = s.find("ch1/hit/flag").unwrap();
        assert!(matches!(flag.annotation, Some(Annotation::Unreadable(_))));
        assert!(s.find("ch1/hit/energy").unwrap().annotation.is_none());
        assert!(s.to_string().contains("flag <unreadable>"));
    }

    #[test]
    fn test_corrupt_group_still_lists_children() {
        let f = sample();
        f.backend()
            .storage()
            .set(
                &StoreKey::new("ch1/attributes.json").unwrap(),
                Bytes::from_static(b"[1, 2"),
            )
            .unwrap();
        let s = inspect(&f, "", None).unwrap();
        let ch1 = s.find("ch1").unwrap();
        assert!(matches!(ch1.annotation, Some(Annotation::Unreadable(_))));
        let hit = s.find("ch1/hit").unwrap();
        assert_eq!(hit.datatype.as_deref(), Some("table{energy,flag}"));
        assert!(s.find("ch1/hit/energy").is_some());
        let rendered = s.to_string();
        assert!(rendered.contains("ch1 <unreadable>"));
        assert!(rendered.contains("hit · table{energy,flag}"));
    }

    #[test]
    fn test_missing_declared_field_is_annotated() {
        let f = sample();
        f.backend().erase("ch1/hit/flag").unwrap();
        let s = inspect(&f, "", None).unwrap();
        let hit = s.find("ch1/hit").unwrap();
        assert_eq!(
            hit.annotation,
            Some(Annotation::MissingFields(vec!["flag".to_owned()]))
        );
        assert!(s.to_string().contains("hit · table{energy,flag} <incomplete>"));
        assert!(f.read("ch1/hit", &crate::ReadOptions::default()).is_err());
    }

    #[test]
    fn test_incomplete_node_is_annotated() {
        let f = sample();
        let mut meta = f.backend().node_metadata("ch1/hit/energy").unwrap();
        meta.set_incomplete(true);
        f.backend().set_metadata("ch1/hit/energy", &meta).unwrap();
        let s = inspect(&f, "", None).unwrap();
        assert_eq!(
            s.find("ch1/hit/energy").unwrap().annotation,
            Some(Annotation::Incomplete)
        );
    }
}
