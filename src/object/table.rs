use std::ops::Range;

use crate::datatype::{Datatype, validate_name};
use crate::metadata::Attributes;

use super::{Array, Lh5Object, Struct};

/// Columnar data: named fields that all have the same number of rows.
///
/// Columns are arrays, vectors of vectors or nested tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    fields: Vec<(String, Lh5Object)>,
    size: usize,
    attrs: Attributes,
}

fn column_rows(name: &str, field: &Lh5Object) -> crate::Result<usize> {
    field.num_rows().ok_or_else(|| {
        crate::Error::TypeMismatch(format!(
            "table column '{name}' must be array-like, got {}",
            field.type_name()
        ))
    })
}

impl Table {
    /// An empty table without fields.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I, S, O>(fields: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = (S, O)>,
        S: Into<String>,
        O: Into<Lh5Object>,
    {
        let mut out = Self::new();
        for (name, field) in fields {
            let name = name.into();
            if out.contains(&name) {
                return Err(crate::Error::InvalidName(format!("duplicate field '{name}'")));
            }
            out.insert(name, field)?;
        }
        Ok(out)
    }

    /// Convert a struct whose fields are equal-length columns.
    pub fn from_struct(s: Struct) -> crate::Result<Self> {
        let attrs = s.attrs().clone();
        Ok(Self::from_fields(s.into_fields())?.with_attrs(attrs))
    }

    /// A waveform table: start times `t0`, sampling periods `dt` and the samples.
    pub fn waveforms(t0: Array, dt: Array, values: impl Into<Lh5Object>) -> crate::Result<Self> {
        let values = values.into();
        if !matches!(
            values,
            Lh5Object::Array(_) | Lh5Object::VectorOfVectors(_) | Lh5Object::EncodedArray(_)
        ) {
            return Err(crate::Error::TypeMismatch(format!(
                "waveform values must be an array, a vector of vectors or encoded waveforms, got {}",
                values.type_name()
            )));
        }
        Self::from_fields([
            ("t0", Lh5Object::from(t0)),
            ("dt", Lh5Object::from(dt)),
            ("values", values),
        ])
    }

    /// Whether the table holds the `t0`, `dt` and `values` columns of a waveform table.
    pub fn is_waveform_table(&self) -> bool {
        ["t0", "dt", "values"].iter().all(|name| self.contains(name))
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    /// Insert or replace a column, returning the previous one.
    ///
    /// The first column fixes the row count; later columns must match it.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        field: impl Into<Lh5Object>,
    ) -> crate::Result<Option<Lh5Object>> {
        let name = name.into();
        validate_name(&name)?;
        let field = field.into();
        let rows = column_rows(&name, &field)?;
        let only_this = self.fields.len() == 1 && self.fields[0].0 == name;
        if !self.fields.is_empty() && !only_this && rows != self.size {
            return Err(crate::Error::ShapeMismatch(format!(
                "column '{name}' has {rows} rows, table has {}",
                self.size
            )));
        }
        self.size = rows;
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, old)) => Ok(Some(std::mem::replace(old, field))),
            None => {
                self.fields.push((name, field));
                Ok(None)
            }
        }
    }

    pub fn get(&self, name: &str) -> crate::Result<&Lh5Object> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
            .ok_or_else(|| crate::Error::FieldNotFound(name.to_owned()))
    }

    pub fn remove(&mut self, name: &str) -> crate::Result<Lh5Object> {
        let idx = self
            .fields
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| crate::Error::FieldNotFound(name.to_owned()))?;
        let (_, field) = self.fields.remove(idx);
        if self.fields.is_empty() {
            self.size = 0;
        }
        Ok(field)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Lh5Object)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn datatype(&self) -> Datatype {
        Datatype::Table(self.names().map(str::to_owned).collect())
    }

    /// Rows `range` of every column.
    pub fn slice(&self, range: Range<usize>) -> crate::Result<Self> {
        if range.start > range.end || range.end > self.size {
            return Err(crate::Error::ShapeMismatch(format!(
                "row range {range:?} out of bounds for {} rows",
                self.size
            )));
        }
        let fields = self
            .fields
            .iter()
            .map(|(n, f)| Ok((n.clone(), f.slice_rows(range.clone())?)))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self {
            fields,
            size: range.end - range.start,
            attrs: self.attrs.clone(),
        })
    }

    /// Row `index` as a struct of one-row columns.
    pub fn row(&self, index: usize) -> crate::Result<Struct> {
        if index >= self.size {
            return Err(crate::Error::ShapeMismatch(format!(
                "row {index} out of bounds for {} rows",
                self.size
            )));
        }
        let mut out = Struct::new();
        for (name, field) in self.iter() {
            out.insert(name, field.slice_rows(index..index + 1)?)?;
        }
        Ok(out)
    }

    /// Append rows given as a struct with one column per table field.
    ///
    /// Fails with [`crate::Error::AppendInconsistent`] if the fields differ
    /// from the table's or the columns have different lengths;
    /// the table is left unchanged on any error.
    pub fn append(&mut self, rows: &Struct) -> crate::Result<()> {
        self.check_append_fields(rows.iter())?;
        for (name, field) in self.fields.iter_mut() {
            if let Ok(new_rows) = rows.get(name) {
                field.append_unchecked(new_rows);
            }
        }
        self.size += rows
            .iter()
            .next()
            .and_then(|(_, f)| f.num_rows())
            .unwrap_or(0);
        Ok(())
    }

    /// Append all rows of another table with the same fields.
    pub fn append_table(&mut self, other: &Table) -> crate::Result<()> {
        self.check_append_table(other)?;
        self.append_unchecked(other);
        Ok(())
    }

    pub(crate) fn check_append_table(&self, other: &Table) -> crate::Result<()> {
        self.check_append_fields(other.iter())
    }

    fn check_append_fields<'a>(
        &self,
        rows: impl Iterator<Item = (&'a str, &'a Lh5Object)>,
    ) -> crate::Result<()> {
        let inconsistent = |reason: String| crate::Error::append_inconsistent("table", reason);
        let rows: Vec<_> = rows.collect();
        if rows.len() != self.fields.len() {
            return Err(inconsistent(format!(
                "expected fields {:?}, got {:?}",
                self.names().collect::<Vec<_>>(),
                rows.iter().map(|(n, _)| *n).collect::<Vec<_>>()
            )));
        }
        let mut n_rows = None;
        for (name, field) in &rows {
            let Ok(column) = self.get(name) else {
                return Err(inconsistent(format!("unexpected field '{name}'")));
            };
            let len = field
                .num_rows()
                .ok_or_else(|| inconsistent(format!("field '{name}' is not array-like")))?;
            match n_rows {
                None => n_rows = Some(len),
                Some(n) if n != len => {
                    return Err(inconsistent(format!(
                        "field '{name}' has {len} rows, expected {n}"
                    )));
                }
                Some(_) => {}
            }
            column
                .check_append(field)
                .map_err(|e| inconsistent(format!("field '{name}': {e}")))?;
        }
        Ok(())
    }

    pub(crate) fn append_unchecked(&mut self, other: &Table) {
        for (name, field) in self.fields.iter_mut() {
            if let Ok(rows) = other.get(name) {
                field.append_unchecked(rows);
            }
        }
        self.size += other.size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Scalar, VectorOfVectors};

    fn energy_flag() -> Table {
        Table::from_fields([
            ("energy", Array::new(vec![1.0f64, 2.0, 3.0])),
            ("flag", Array::new(vec![0u8, 1, 0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_consistency() {
        let t = energy_flag();
        assert_eq!(t.len(), 3);
        assert_eq!(t.datatype().to_string(), "table{energy,flag}");
        assert!(matches!(
            Table::from_fields([
                ("a", Array::new(vec![1u8])),
                ("b", Array::new(vec![1u8, 2])),
            ]),
            Err(crate::Error::ShapeMismatch(_))
        ));
        assert!(matches!(
            Table::from_fields([("s", Lh5Object::from(Scalar::new(1u8)))]),
            Err(crate::Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_replace_single_column_changes_size() {
        let mut t = Table::from_fields([("a", Array::new(vec![1u8]))]).unwrap();
        t.insert("a", Array::new(vec![1u8, 2, 3])).unwrap();
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_slice_and_row() {
        let t = energy_flag();
        let s = t.slice(1..3).unwrap();
        assert_eq!(
            s,
            Table::from_fields([
                ("energy", Array::new(vec![2.0f64, 3.0])),
                ("flag", Array::new(vec![1u8, 0])),
            ])
            .unwrap()
        );
        let row = t.row(1).unwrap();
        assert_eq!(
            row.get("flag").unwrap(),
            &Lh5Object::from(Array::new(vec![1u8]))
        );
        assert!(t.row(3).is_err());
    }

    #[test]
    fn test_append_row() {
        let mut t = energy_flag();
        let row = Struct::from_fields([
            ("energy", Array::new(vec![4.0f64])),
            ("flag", Array::new(vec![1u8])),
        ])
        .unwrap();
        t.append(&row).unwrap();
        assert_eq!(t.len(), 4);
        assert_eq!(t.get("flag").unwrap().num_rows(), Some(4));
    }

    #[test]
    fn test_append_mismatched_length_is_atomic() {
        let mut t = energy_flag();
        let rows = Struct::from_fields([
            ("energy", Array::new(vec![4.0f64, 5.0])),
            ("flag", Array::new(vec![1u8])),
        ])
        .unwrap();
        assert!(matches!(
            t.append(&rows),
            Err(crate::Error::AppendInconsistent { .. })
        ));
        assert_eq!(t, energy_flag());

        let wrong_type = Struct::from_fields([
            ("energy", Array::new(vec![4.0f64])),
            ("flag", Array::new(vec![1.0f32])),
        ])
        .unwrap();
        assert!(matches!(
            t.append(&wrong_type),
            Err(crate::Error::AppendInconsistent { .. })
        ));
        let missing = Struct::from_fields([("energy", Array::new(vec![4.0f64]))]).unwrap();
        assert!(t.append(&missing).is_err());
        assert_eq!(t.get("energy").unwrap().num_rows(), Some(3));
        assert_eq!(t.get("flag").unwrap().num_rows(), Some(3));
    }

    #[test]
    fn test_waveforms() {
        let wf = Table::waveforms(
            Array::new(vec![0.0f64, 10.0]).with_units("ns"),
            Array::new(vec![16.0f32, 16.0]).with_units("ns"),
            Array::equal_sized(vec![0u16; 8], 4).unwrap(),
        )
        .unwrap();
        assert_eq!(wf.len(), 2);
        assert_eq!(
            wf.datatype().to_string(),
            "table{t0,dt,values}"
        );
        assert!(
            Table::waveforms(
                Array::new(vec![0.0f64]),
                Array::new(vec![1.0f64]),
                Scalar::new(3u16),
            )
            .is_err()
        );
        let ragged = Table::waveforms(
            Array::new(vec![0.0f64, 1.0]),
            Array::new(vec![1.0f64, 1.0]),
            VectorOfVectors::from_vecs(vec![vec![1u16, 2], vec![3]]),
        )
        .unwrap();
        assert_eq!(ragged.len(), 2);
        assert!(ragged.is_waveform_table());
        assert!(!Table::from_fields([("t0", Array::new(vec![0u8]))])
            .unwrap()
            .is_waveform_table());
    }
}
