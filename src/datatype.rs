//! LH5 datatype descriptors.
//!
//! Every LH5 node carries a `datatype` attribute describing its logical type,
//! e.g. `real`, `array<1>{real}`, `array<1>{array<1>{real}}` or `table{t0,dt,values}`.
//! The numeric width of elements is not part of the descriptor; it is the
//! `dataType` of the backend dataset.

use std::fmt;
use std::str::FromStr;

use crate::object::Lh5Object;

/// Element category named inside a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Real,
    Bool,
    Complex,
    String,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Real => "real",
            ElementKind::Bool => "bool",
            ElementKind::Complex => "complex",
            ElementKind::String => "string",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "real" => Some(ElementKind::Real),
            "bool" => Some(ElementKind::Bool),
            "complex" => Some(ElementKind::Complex),
            "string" => Some(ElementKind::String),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical type of an LH5 object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datatype {
    /// `real`, `bool`, `complex` or `string`.
    Scalar(ElementKind),
    /// `array<N>{elem}`
    Array { ndim: usize, element: ElementKind },
    /// `fixedsize_array<N>{elem}`
    FixedSizeArray { ndim: usize, element: ElementKind },
    /// `array_of_equalsized_arrays<O,I>{elem}`
    ArrayOfEqualSizedArrays {
        outer: usize,
        inner: usize,
        element: ElementKind,
    },
    /// `array<1>{inner}`, where `inner` is `array<1>{elem}` or another vector of vectors.
    VectorOfVectors(Box<Datatype>),
    /// `array<1>{encoded_array<1>{elem}}`: ragged waveforms, each compressed separately.
    VectorOfEncodedVectors(ElementKind),
    /// `array_of_encoded_equalsized_arrays<1,1>{elem}`: equal-length waveforms, each
    /// compressed separately.
    ArrayOfEncodedEqualSizedArrays(ElementKind),
    /// `struct{a,b}`
    Struct(Vec<String>),
    /// `table{a,b}`
    Table(Vec<String>),
}

impl Datatype {
    /// Wrap `inner` in a vector of vectors, checking that it is a valid ragged element.
    pub fn vector_of_vectors(inner: Datatype) -> crate::Result<Self> {
        match inner {
            Datatype::Array { ndim: 1, .. } | Datatype::VectorOfVectors(_) => {
                Ok(Datatype::VectorOfVectors(Box::new(inner)))
            }
            other => Err(crate::Error::malformed(
                format!("array<1>{{{other}}}"),
                "vector of vectors must wrap array<1>{..} or another vector of vectors",
            )),
        }
    }

    /// Nesting depth of a vector of vectors; 0 for anything else.
    pub fn depth(&self) -> usize {
        match self {
            Datatype::VectorOfVectors(inner) => 1 + inner.depth(),
            _ => 0,
        }
    }

    /// Field names of structs and tables.
    pub fn fields(&self) -> Option<&[String]> {
        match self {
            Datatype::Struct(f) | Datatype::Table(f) => Some(f),
            _ => None,
        }
    }

    /// Innermost element category, if any.
    pub fn element(&self) -> Option<ElementKind> {
        match self {
            Datatype::Scalar(e)
            | Datatype::Array { element: e, .. }
            | Datatype::FixedSizeArray { element: e, .. }
            | Datatype::ArrayOfEqualSizedArrays { element: e, .. }
            | Datatype::VectorOfEncodedVectors(e)
            | Datatype::ArrayOfEncodedEqualSizedArrays(e) => Some(*e),
            Datatype::VectorOfVectors(inner) => inner.element(),
            Datatype::Struct(_) | Datatype::Table(_) => None,
        }
    }

    /// Name of the object type this descriptor decodes to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datatype::Scalar(_) => "Scalar",
            Datatype::Array { .. } => "Array",
            Datatype::FixedSizeArray { .. } => "FixedSizeArray",
            Datatype::ArrayOfEqualSizedArrays { .. } => "ArrayOfEqualSizedArrays",
            Datatype::VectorOfVectors(_) => "VectorOfVectors",
            Datatype::VectorOfEncodedVectors(_) => "VectorOfEncodedVectors",
            Datatype::ArrayOfEncodedEqualSizedArrays(_) => "ArrayOfEncodedEqualSizedArrays",
            Datatype::Struct(_) => "Struct",
            Datatype::Table(_) => "Table",
        }
    }

    /// Whether the object is stored as a backend group rather than a dataset.
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            Datatype::VectorOfVectors(_)
                | Datatype::VectorOfEncodedVectors(_)
                | Datatype::ArrayOfEncodedEqualSizedArrays(_)
                | Datatype::Struct(_)
                | Datatype::Table(_)
        )
    }

    /// Names of the children a group of this type must hold.
    pub fn required_children(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Datatype::Struct(fields) | Datatype::Table(fields) => return fields.clone(),
            Datatype::VectorOfVectors(_) => &["flattened_data", "cumulative_length"],
            Datatype::VectorOfEncodedVectors(_) | Datatype::ArrayOfEncodedEqualSizedArrays(_) => {
                &["encoded_data", "decoded_size"]
            }
            _ => &[],
        };
        names.iter().map(|n| n.to_string()).collect()
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Scalar(e) => write!(f, "{e}"),
            Datatype::Array { ndim, element } => write!(f, "array<{ndim}>{{{element}}}"),
            Datatype::FixedSizeArray { ndim, element } => {
                write!(f, "fixedsize_array<{ndim}>{{{element}}}")
            }
            Datatype::ArrayOfEqualSizedArrays {
                outer,
                inner,
                element,
            } => write!(f, "array_of_equalsized_arrays<{outer},{inner}>{{{element}}}"),
            Datatype::VectorOfVectors(inner) => write!(f, "array<1>{{{inner}}}"),
            Datatype::VectorOfEncodedVectors(element) => {
                write!(f, "array<1>{{encoded_array<1>{{{element}}}}}")
            }
            Datatype::ArrayOfEncodedEqualSizedArrays(element) => {
                write!(f, "array_of_encoded_equalsized_arrays<1,1>{{{element}}}")
            }
            Datatype::Struct(fields) => write!(f, "struct{{{}}}", fields.join(",")),
            Datatype::Table(fields) => write!(f, "table{{{}}}", fields.join(",")),
        }
    }
}

impl FromStr for Datatype {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s.trim()).map_err(|reason| crate::Error::malformed(s, reason))
    }
}

/// Encode the datatype descriptor of an object.
pub fn encode_datatype(object: &Lh5Object) -> String {
    object.datatype().to_string()
}

/// Decode a datatype descriptor.
pub fn decode_datatype(descriptor: &str) -> crate::Result<Datatype> {
    descriptor.parse()
}

/// Check that `name` can be used as a struct field or path component.
pub(crate) fn validate_name(name: &str) -> crate::Result<()> {
    let bad = name.is_empty()
        || name != name.trim()
        || name == "."
        || name == ".."
        || name == crate::metadata::METADATA_KEY
        || name.contains([',', '{', '}', '/']);
    if bad {
        Err(crate::Error::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}

type ParseResult<T> = Result<T, String>;

fn parse(s: &str) -> ParseResult<Datatype> {
    if let Some(element) = ElementKind::from_name(s) {
        return Ok(Datatype::Scalar(element));
    }
    if let Some(rest) = s.strip_prefix("struct") {
        return parse_fields(rest).map(Datatype::Struct);
    }
    if let Some(rest) = s.strip_prefix("table") {
        return parse_fields(rest).map(Datatype::Table);
    }
    if let Some(rest) = s.strip_prefix("array_of_encoded_equalsized_arrays") {
        let (params, body) = split_params(rest)?;
        if parse_dims(params)? != [1, 1] {
            return Err(format!("encoded equal-sized arrays must be <1,1>, got <{params}>"));
        }
        return parse_element(body).map(Datatype::ArrayOfEncodedEqualSizedArrays);
    }
    if let Some(rest) = s.strip_prefix("array_of_equalsized_arrays") {
        let (params, body) = split_params(rest)?;
        let dims = parse_dims(params)?;
        let [outer, inner] = dims[..] else {
            return Err(format!("expected two dimensions, got {}", dims.len()));
        };
        return Ok(Datatype::ArrayOfEqualSizedArrays {
            outer,
            inner,
            element: parse_element(body)?,
        });
    }
    if let Some(rest) = s.strip_prefix("fixedsize_array") {
        let (params, body) = split_params(rest)?;
        return Ok(Datatype::FixedSizeArray {
            ndim: parse_single_dim(params)?,
            element: parse_element(body)?,
        });
    }
    if let Some(rest) = s.strip_prefix("array") {
        let (params, body) = split_params(rest)?;
        let ndim = parse_single_dim(params)?;
        if let Some(element) = ElementKind::from_name(body.trim()) {
            return Ok(Datatype::Array { ndim, element });
        }
        if ndim != 1 {
            return Err(format!("vector of vectors must be array<1>, got array<{ndim}>"));
        }
        if let Some(encoded) = body.trim().strip_prefix("encoded_array") {
            let (params, element) = split_params(encoded)?;
            if parse_single_dim(params)? != 1 {
                return Err(format!("encoded arrays must be <1>, got <{params}>"));
            }
            return parse_element(element).map(Datatype::VectorOfEncodedVectors);
        }
        return match parse(body.trim())? {
            inner @ (Datatype::Array { ndim: 1, .. } | Datatype::VectorOfVectors(_)) => {
                Ok(Datatype::VectorOfVectors(Box::new(inner)))
            }
            other => Err(format!("invalid vector of vectors element '{other}'")),
        };
    }
    Err("unknown datatype".into())
}

/// Split `<params>{body}` into its parts.
fn split_params(rest: &str) -> ParseResult<(&str, &str)> {
    let rest = rest
        .strip_prefix('<')
        .ok_or_else(|| "expected '<'".to_string())?;
    let (params, rest) = rest
        .split_once('>')
        .ok_or_else(|| "unterminated '<'".to_string())?;
    let body = braced(rest)?;
    Ok((params, body))
}

fn braced(rest: &str) -> ParseResult<&str> {
    rest.strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .ok_or_else(|| format!("expected '{{...}}', got '{rest}'"))
}

fn parse_dims(params: &str) -> ParseResult<Vec<usize>> {
    params
        .split(',')
        .map(|p| {
            let p = p.trim();
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("invalid dimension '{p}'"));
            }
            match p.parse::<usize>() {
                Ok(0) | Err(_) => Err(format!("invalid dimension '{p}'")),
                Ok(n) => Ok(n),
            }
        })
        .collect()
}

fn parse_single_dim(params: &str) -> ParseResult<usize> {
    match parse_dims(params)?[..] {
        [n] => Ok(n),
        ref dims => Err(format!("expected one dimension, got {}", dims.len())),
    }
}

fn parse_element(body: &str) -> ParseResult<ElementKind> {
    ElementKind::from_name(body.trim()).ok_or_else(|| format!("unknown element type '{body}'"))
}

fn parse_fields(rest: &str) -> ParseResult<Vec<String>> {
    let body = braced(rest)?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut fields: Vec<String> = Vec::new();
    for name in body.split(',') {
        let name = name.trim();
        validate_name(name).map_err(|_| format!("invalid field name '{name}'"))?;
        if fields.iter().any(|f| f == name) {
            return Err(format!("duplicate field '{name}'"));
        }
        fields.push(name.to_owned());
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_types() -> Vec<Datatype> {
        let array = Datatype::Array {
            ndim: 1,
            element: ElementKind::Real,
        };
        let vov = Datatype::vector_of_vectors(array.clone()).unwrap();
        vec![
            Datatype::Scalar(ElementKind::Real),
            Datatype::Scalar(ElementKind::Bool),
            Datatype::Scalar(ElementKind::Complex),
            Datatype::Scalar(ElementKind::String),
            array.clone(),
            Datatype::Array {
                ndim: 3,
                element: ElementKind::Bool,
            },
            Datatype::FixedSizeArray {
                ndim: 1,
                element: ElementKind::Real,
            },
            Datatype::ArrayOfEqualSizedArrays {
                outer: 1,
                inner: 1,
                element: ElementKind::Real,
            },
            vov.clone(),
            Datatype::vector_of_vectors(vov).unwrap(),
            Datatype::Struct(vec![]),
            Datatype::Struct(vec!["a".into(), "b_c".into()]),
            Datatype::Table(vec!["t0".into(), "dt".into(), "values".into()]),
            Datatype::VectorOfEncodedVectors(ElementKind::Real),
            Datatype::ArrayOfEncodedEqualSizedArrays(ElementKind::Real),
        ]
    }

    #[test]
    fn test_bijection() {
        for t in all_types() {
            let s = t.to_string();
            let back = decode_datatype(&s).unwrap();
            assert_eq!(back, t, "{s}");
            assert_eq!(back.to_string(), s);
        }
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(
            decode_datatype("array<1>{array<1>{real}}").unwrap(),
            Datatype::VectorOfVectors(Box::new(Datatype::Array {
                ndim: 1,
                element: ElementKind::Real
            }))
        );
        assert_eq!(
            decode_datatype("array<1>{array<1>{array<1>{real}}}")
                .unwrap()
                .depth(),
            2
        );
        assert_eq!(
            decode_datatype("array_of_equalsized_arrays<1,1>{real}")
                .unwrap()
                .type_name(),
            "ArrayOfEqualSizedArrays"
        );
    }

    #[test]
    fn test_older_spellings() {
        assert_eq!(
            decode_datatype(" table{t0, dt, values} ").unwrap(),
            Datatype::Table(vec!["t0".into(), "dt".into(), "values".into()])
        );
        assert_eq!(
            decode_datatype("struct{ }").unwrap(),
            Datatype::Struct(vec![])
        );
    }

    #[test]
    fn test_malformed() {
        for s in [
            "",
            "float",
            "array{real}",
            "array<>{real}",
            "array<0>{real}",
            "array<1>{float}",
            "array<2>{array<1>{real}}",
            "array<1>{struct{a}}",
            "array<1>{array<1>{real}",
            "array_of_equalsized_arrays<1>{real}",
            "fixedsize_array<1,1>{real}",
            "struct{a,a}",
            "struct{a,,b}",
            "struct{a/b}",
            "table",
            "real<1>",
            "array<2>{encoded_array<1>{real}}",
            "array<1>{encoded_array<2>{real}}",
            "array<1>{encoded_array<1>{float}}",
            "array_of_encoded_equalsized_arrays<1,2>{real}",
            "array_of_encoded_equalsized_arrays<1>{real}",
        ] {
            assert!(
                matches!(
                    decode_datatype(s),
                    Err(crate::Error::MalformedDatatype { .. })
                ),
                "{s} should be malformed"
            );
        }
    }

    #[test]
    fn test_vector_of_vectors_constructor() {
        assert!(Datatype::vector_of_vectors(Datatype::Scalar(ElementKind::Real)).is_err());
        assert!(
            Datatype::vector_of_vectors(Datatype::Array {
                ndim: 2,
                element: ElementKind::Real
            })
            .is_err()
        );
    }

    #[test]
    fn test_encoded_waveforms() {
        let vector = decode_datatype("array<1>{encoded_array<1>{real}}").unwrap();
        assert_eq!(vector, Datatype::VectorOfEncodedVectors(ElementKind::Real));
        assert_eq!(vector.type_name(), "VectorOfEncodedVectors");
        assert!(vector.is_group());
        assert_eq!(vector.depth(), 0);

        let equal = decode_datatype(" array_of_encoded_equalsized_arrays< 1, 1 >{ real } ").unwrap();
        assert_eq!(equal.to_string(), "array_of_encoded_equalsized_arrays<1,1>{real}");
        assert_eq!(
            equal.required_children(),
            vec!["encoded_data".to_string(), "decoded_size".to_string()]
        );
    }

    #[test]
    fn test_required_children() {
        let table = Datatype::Table(vec!["t0".into(), "dt".into()]);
        assert_eq!(table.required_children(), vec!["t0", "dt"]);
        let vov = decode_datatype("array<1>{array<1>{real}}").unwrap();
        assert_eq!(
            vov.required_children(),
            vec!["flattened_data", "cumulative_length"]
        );
        assert!(Datatype::Scalar(ElementKind::Real).required_children().is_empty());
    }
}
