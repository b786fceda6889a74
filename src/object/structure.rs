use crate::datatype::{Datatype, validate_name};
use crate::metadata::Attributes;

use super::Lh5Object;

/// Named fields of any LH5 type, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Struct {
    fields: Vec<(String, Lh5Object)>,
    attrs: Attributes,
}

impl Struct {
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

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    /// Insert or replace a field, returning the previous value.
    ///
    /// A replaced field keeps its position.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        field: impl Into<Lh5Object>,
    ) -> crate::Result<Option<Lh5Object>> {
        let name = name.into();
        validate_name(&name)?;
        let field = field.into();
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

    pub fn get_mut(&mut self, name: &str) -> crate::Result<&mut Lh5Object> {
        self.fields
            .iter_mut()
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
        Ok(self.fields.remove(idx).1)
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

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn datatype(&self) -> Datatype {
        Datatype::Struct(self.names().map(str::to_owned).collect())
    }

    pub(crate) fn check_append(&self, other: &Struct) -> crate::Result<()> {
        if self.len() != other.len() {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot append struct with fields {:?} to struct with fields {:?}",
                other.names().collect::<Vec<_>>(),
                self.names().collect::<Vec<_>>()
            )));
        }
        for (name, field) in self.iter() {
            field.check_append(other.get(name)?)?;
        }
        Ok(())
    }

    pub(crate) fn append_unchecked(&mut self, other: &Struct) {
        for (name, field) in self.fields.iter_mut() {
            if let Ok(rows) = other.get(name) {
                field.append_unchecked(rows);
            }
        }
    }

    pub(crate) fn into_fields(self) -> Vec<(String, Lh5Object)> {
        self.fields
    }
}

impl<'a> IntoIterator for &'a Struct {
    type Item = (&'a str, &'a Lh5Object);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Lh5Object)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Array, Scalar};

    #[test]
    fn test_fields_keep_order() {
        let s = Struct::from_fields([
            ("z", Lh5Object::from(Scalar::new(1u8))),
            ("a", Array::new(vec![1.0f64]).into()),
        ])
        .unwrap();
        assert_eq!(s.names().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(s.datatype().to_string(), "struct{z,a}");
    }

    #[test]
    fn test_lookup() {
        let mut s = Struct::new();
        assert!(s.insert("x", Scalar::new(1i64)).unwrap().is_none());
        assert!(matches!(s.get("y"), Err(crate::Error::FieldNotFound(_))));
        let old = s.insert("x", Scalar::new(2i64)).unwrap();
        assert_eq!(old, Some(Scalar::new(1i64).into()));
        assert_eq!(s.len(), 1);
        assert!(matches!(s.remove("y"), Err(crate::Error::FieldNotFound(_))));
        s.remove("x").unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn test_invalid_names() {
        let mut s = Struct::new();
        assert!(s.insert("a,b", Scalar::new(1u8)).is_err());
        assert!(s.insert("", Scalar::new(1u8)).is_err());
        assert!(Struct::from_fields([("a", Scalar::new(1u8)), ("a", Scalar::new(2u8))]).is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = Struct::from_fields([("x", Array::new(vec![1u8, 2]))]).unwrap();
        let b = Struct::from_fields([("x", Array::new(vec![1u8, 2]))]).unwrap();
        assert_eq!(a, b);
    }
}
