//! Copy a row range of every object in a file into a new file.
//!
//! Handy for producing small test files from production data.

use std::ops::Range;
use std::path::Path;

use glob::Pattern;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::datatype::{Datatype, decode_datatype};
use crate::file::{FileMode, Lh5File};
use crate::object::{Lh5Object, Struct, Table};
use crate::read::ReadOptions;
use crate::storage::join_path;
use crate::write::WriteOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncateOptions {
    /// Glob patterns of the paths to copy. Descendants of a match are copied
    /// too, and so are the groups, structs and tables leading to a match.
    pub include: Option<Vec<String>>,
    /// Glob patterns of paths never to copy, with their descendants.
    pub exclude: Vec<String>,
    /// Replace the output file if it exists.
    pub overwrite: bool,
}

impl TruncateOptions {
    pub fn path_filter(&self) -> crate::Result<PathFilter> {
        PathFilter::new(self)
    }
}

/// Compiled include and exclude patterns.
///
/// Patterns are shell globs in which `*` also matches `/`. Leading and
/// trailing slashes are ignored.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<Vec<Pattern>>,
    /// Leading segments of every include pattern.
    include_parents: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

fn compile(pattern: &str) -> crate::Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| crate::Error::general(format!("invalid pattern '{pattern}': {e}")))
}

/// `a`, `a/b`, `a/b/c` for `a/b/c`.
fn ancestors_and_self(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(|(i, _)| &path[..i])
        .chain(std::iter::once(path))
}

impl PathFilter {
    pub fn new(options: &TruncateOptions) -> crate::Result<Self> {
        let exclude = options
            .exclude
            .iter()
            .map(|p| compile(p.trim_matches('/')))
            .collect::<crate::Result<_>>()?;
        let mut include_parents = Vec::new();
        let include = match &options.include {
            None => None,
            Some(patterns) => {
                let mut compiled = Vec::with_capacity(patterns.len());
                for pattern in patterns {
                    let pattern = pattern.trim_matches('/');
                    for (i, _) in pattern.match_indices('/') {
                        include_parents.push(compile(&pattern[..i])?);
                    }
                    compiled.push(compile(pattern)?);
                }
                Some(compiled)
            }
        };
        Ok(Self {
            include,
            include_parents,
            exclude,
        })
    }

    /// Whether the object at `path` should be copied.
    ///
    /// `container` is true for groups, structs and tables, which are kept
    /// when something below them may be included.
    pub fn is_included(&self, path: &str, container: bool) -> bool {
        let matches_any = |patterns: &[Pattern], p: &str| patterns.iter().any(|g| g.matches(p));
        if ancestors_and_self(path).any(|p| matches_any(&self.exclude, p)) {
            return false;
        }
        let Some(include) = &self.include else {
            return true;
        };
        ancestors_and_self(path).any(|p| matches_any(include, p))
            || (container && matches_any(&self.include_parents, path))
    }
}

/// Drop excluded fields of structs and tables; `None` if nothing is left.
///
/// Waveform tables are kept whole or not at all.
fn filter_object(
    object: Lh5Object,
    path: &str,
    filter: &PathFilter,
) -> crate::Result<Option<Lh5Object>> {
    let container = matches!(object, Lh5Object::Struct(_) | Lh5Object::Table(_));
    if !filter.is_included(path, container) {
        debug!("skipping '{path}'");
        return Ok(None);
    }
    let out = match object {
        Lh5Object::Struct(s) => {
            let attrs = s.attrs().clone();
            let mut out = Struct::new().with_attrs(attrs);
            for (name, field) in s.into_fields() {
                if let Some(field) = filter_object(field, &join_path(path, &name), filter)? {
                    out.insert(name, field)?;
                }
            }
            (!out.is_empty()).then(|| out.into())
        }
        Lh5Object::Table(t) => {
            let attrs = t.attrs().clone();
            let waveforms = t.is_waveform_table();
            let mut columns = Vec::new();
            for (name, field) in t.iter() {
                match filter_object(field.clone(), &join_path(path, name), filter)? {
                    Some(field) => columns.push((name.to_owned(), field)),
                    None if waveforms && ["t0", "dt", "values"].contains(&name) => {
                        debug!("skipping waveform table '{path}' without '{name}'");
                        return Ok(None);
                    }
                    None => {}
                }
            }
            if columns.is_empty() {
                None
            } else {
                Some(Table::from_fields(columns)?.with_attrs(attrs).into())
            }
        }
        other => Some(other),
    };
    Ok(out)
}

fn copy_node(
    src: &Lh5File,
    dst: &mut Lh5File,
    path: &str,
    rows: &Range<u64>,
    filter: &PathFilter,
) -> crate::Result<()> {
    let meta = src.backend().node_metadata(path)?;
    let Some(descriptor) = meta.datatype() else {
        if !filter.is_included(path, true) {
            debug!("skipping '{path}'");
            return Ok(());
        }
        // plain group holding LH5 objects
        for name in src.backend().list_children(path)? {
            copy_node(src, dst, &join_path(path, &name), rows, filter)?;
        }
        return Ok(());
    };
    let container = matches!(
        decode_datatype(descriptor)?,
        Datatype::Struct(_) | Datatype::Table(_)
    );
    if !filter.is_included(path, container) {
        debug!("skipping '{path}'");
        return Ok(());
    }
    info!("copying rows {rows:?} of '{path}'");
    let object = src.read(path, &ReadOptions::default().with_rows(rows.clone()))?;
    if let Some(object) = filter_object(object, path, filter)? {
        dst.write(&object, path, &WriteOptions::default())?;
    }
    Ok(())
}

/// Copy rows `rows` of every included object of `src` into `dst`.
///
/// Scalars are copied whole.
pub fn truncate_into(
    src: &Lh5File,
    dst: &mut Lh5File,
    rows: Range<u64>,
    options: &TruncateOptions,
) -> crate::Result<()> {
    let filter = options.path_filter()?;
    for name in src.backend().list_children("")? {
        copy_node(src, dst, &name, &rows, &filter)?;
    }
    Ok(())
}

/// Write rows `rows` of every included object of the file at `input` to a new file at `output`.
pub fn truncate(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    rows: Range<u64>,
    options: &TruncateOptions,
) -> crate::Result<()> {
    options.path_filter()?;
    let src = Lh5File::open(input, FileMode::Read)?;
    let mode = if options.overwrite {
        FileMode::Overwrite
    } else {
        FileMode::Create
    };
    let mut dst = Lh5File::open(output, mode)?;
    truncate_into(&src, &mut dst, rows, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Array;

    fn filter(include: Option<&[&str]>, exclude: &[&str]) -> PathFilter {
        TruncateOptions {
            include: include.map(|i| i.iter().map(|p| p.to_string()).collect()),
            exclude: exclude.iter().map(|p| p.to_string()).collect(),
            overwrite: false,
        }
        .path_filter()
        .unwrap()
    }

    #[test]
    fn test_is_included() {
        let f = filter(Some(&["/ch1/raw"]), &["ch1/raw/waveform"]);
        assert!(f.is_included("ch1", true));
        assert!(!f.is_included("ch1", false));
        assert!(f.is_included("ch1/raw", true));
        assert!(f.is_included("ch1/raw/energy", false));
        assert!(!f.is_included("ch1/raw/waveform", true));
        assert!(!f.is_included("ch1/raw/waveform/values", false));
        assert!(!f.is_included("ch10", true));
        assert!(filter(None, &[]).is_included("anything", false));
    }

    #[test]
    fn test_glob_patterns() {
        let f = filter(Some(&["ch*/raw"]), &["*/baseline"]);
        assert!(f.is_included("ch1", true));
        assert!(f.is_included("ch22/raw", true));
        assert!(f.is_included("ch22/raw/energy", false));
        assert!(!f.is_included("ch22/raw/baseline", false));
        assert!(!f.is_included("ch22/dsp/energy", false));
        assert!(!f.is_included("summary", true));

        let f = filter(Some(&["*/energy"]), &[]);
        assert!(f.is_included("ch1", true));
        assert!(f.is_included("ch1/raw", true));
        assert!(f.is_included("ch1/raw/energy", false));
        assert!(!f.is_included("ch1/raw/baseline", false));
        assert!(!f.is_included("period", false));

        let bad = TruncateOptions {
            include: Some(vec!["ch[".into()]),
            ..Default::default()
        };
        assert!(bad.path_filter().is_err());
    }

    fn waveform_table() -> Lh5Object {
        let waveform = Table::waveforms(
            Array::new(vec![0.0f64, 1.0]),
            Array::new(vec![16.0f32, 16.0]),
            Array::equal_sized(vec![1u16, 2, 3, 4], 2).unwrap(),
        )
        .unwrap();
        Table::from_fields([
            ("energy", Lh5Object::from(Array::new(vec![1.0f64, 2.0]))),
            ("waveform", waveform.into()),
        ])
        .unwrap()
        .into()
    }

    #[test]
    fn test_waveform_table_is_all_or_nothing() {
        let f = filter(None, &["raw/waveform/values"]);
        let Some(Lh5Object::Table(t)) = filter_object(waveform_table(), "raw", &f).unwrap()
        else {
            panic!("expected a table");
        };
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["energy"]);

        let f = filter(Some(&["raw/waveform/t0", "raw/waveform/dt"]), &[]);
        assert_eq!(filter_object(waveform_table(), "raw", &f).unwrap(), None);

        let f = filter(Some(&["raw/waveform"]), &[]);
        let Some(Lh5Object::Table(t)) = filter_object(waveform_table(), "raw", &f).unwrap()
        else {
            panic!("expected a table");
        };
        let Lh5Object::Table(wf) = t.get("waveform").unwrap() else {
            panic!("expected a waveform table");
        };
        assert!(wf.is_waveform_table());
    }
}
