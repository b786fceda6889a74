use crate::datatype::Datatype;
use crate::dtype::ScalarValue;
use crate::metadata::Attributes;

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    value: ScalarValue,
    attrs: Attributes,
}

impl Scalar {
    pub fn new(value: impl Into<ScalarValue>) -> Self {
        Self {
            value: value.into(),
            attrs: Attributes::new(),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.attrs.insert("units".into(), units.into());
        self
    }

    pub fn value(&self) -> &ScalarValue {
        &self.value
    }

    pub fn units(&self) -> Option<&str> {
        super::units_of(&self.attrs)
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn datatype(&self) -> Datatype {
        Datatype::Scalar(self.value.element_kind())
    }
}
