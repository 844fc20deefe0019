use super::{ColumnsAndValues, Fragment, InsertInto, SetClause, SqlFragment};
use crate::error::{SqlError, SqlResult};
use crate::field::{Field, Row};
use crate::params::ParamGenerator;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A slot between two literal segments of a [`Template`].
#[derive(Debug, Clone, PartialEq)]
pub enum Hole {
    /// Bound as a parameter.
    Value(Field),
    /// Rendered in place, sharing the outer placeholder numbering.
    Fragment(Fragment),
}

/// Conversion into a template [`Hole`].
///
/// Implemented for every type that converts into a [`Field`] (bound as a
/// value) and for every fragment type (spliced in place).
pub trait IntoHole {
    fn into_hole(self) -> Hole;
}

impl IntoHole for Hole {
    fn into_hole(self) -> Hole {
        self
    }
}

macro_rules! impl_into_hole {
    (value: $($ty:ty),* $(,)?) => {
        $(
            impl IntoHole for $ty {
                fn into_hole(self) -> Hole {
                    Hole::Value(self.into())
                }
            }
        )*
    };
    (fragment: $($ty:ty),* $(,)?) => {
        $(
            impl IntoHole for $ty {
                fn into_hole(self) -> Hole {
                    Hole::Fragment(self.into())
                }
            }
        )*
    };
}

impl_into_hole!(value:
    Field, bool, i16, i32, i64, u32, f32, f64, &str, String, &String,
    serde_json::Value, Row, DateTime<Utc>, Uuid,
);
impl_into_hole!(fragment: Fragment, Template, ColumnsAndValues, SetClause, InsertInto);

impl<T: Into<Field>> IntoHole for Option<T> {
    fn into_hole(self) -> Hole {
        Hole::Value(self.into())
    }
}

impl<T: Into<Field>> IntoHole for Vec<T> {
    fn into_hole(self) -> Hole {
        Hole::Value(self.into())
    }
}

/// Literal SQL text interleaved with holes.
///
/// Invariant: there is always exactly one more literal segment than there
/// are holes, so the text both starts and ends with a (possibly empty) literal.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    literals: Vec<String>,
    holes: Vec<Hole>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            literals: vec![String::new()],
            holes: Vec::new(),
        }
    }
}

impl Template {
    /// Create a template with an initial literal segment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            literals: vec![initial_sql.into()],
            holes: Vec::new(),
        }
    }

    /// Create a template from pre-split parts.
    ///
    /// `literals` must hold exactly `holes.len() + 1` segments.
    pub fn from_parts<S: Into<String>>(
        literals: impl IntoIterator<Item = S>,
        holes: impl IntoIterator<Item = Hole>,
    ) -> SqlResult<Self> {
        let literals: Vec<String> = literals.into_iter().map(Into::into).collect();
        let holes: Vec<Hole> = holes.into_iter().collect();
        if literals.len() != holes.len() + 1 {
            let (l, h) = (literals.len(), holes.len());
            return Err(SqlError::usage(format!(
                "template needs one more literal than holes, got {l} literals and {h} holes"
            )));
        }
        Ok(Self { literals, holes })
    }

    /// A template that renders `fragment` and nothing else.
    pub fn embedding(fragment: impl Into<Fragment>) -> Self {
        Self {
            literals: vec![String::new(), String::new()],
            holes: vec![Hole::Fragment(fragment.into())],
        }
    }

    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    /// Append literal text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if let Some(last) = self.literals.last_mut() {
            last.push_str(sql);
        }
        self
    }

    /// Append a hole followed by an empty literal segment.
    pub fn push_hole(&mut self, hole: impl IntoHole) -> &mut Self {
        self.holes.push(hole.into_hole());
        self.literals.push(String::new());
        self
    }

    /// Append a placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Field>) -> &mut Self {
        self.push_hole(Hole::Value(value.into()))
    }

    /// Append another fragment, rendered in place.
    pub fn push_fragment(&mut self, fragment: impl Into<Fragment>) -> &mut Self {
        self.push_hole(Hole::Fragment(fragment.into()))
    }

    /// Bind a value and return `self` (consuming version of [`Template::push_bind`]).
    pub fn bind(mut self, value: impl Into<Field>) -> Self {
        self.push_bind(value);
        self
    }

    /// Embed a fragment and return `self` (consuming version of [`Template::push_fragment`]).
    pub fn embed(mut self, fragment: impl Into<Fragment>) -> Self {
        self.push_fragment(fragment);
        self
    }

    /// Append literal text and return `self`.
    pub fn append(mut self, sql: &str) -> Self {
        self.push(sql);
        self
    }

    pub fn render(&self, params: &mut ParamGenerator) -> SqlFragment {
        if self.holes.is_empty() {
            return SqlFragment {
                text: self.literals.concat(),
                values: Vec::new(),
            };
        }

        let mut text = String::new();
        let mut values = Vec::with_capacity(self.holes.len());
        for (literal, hole) in self.literals.iter().zip(&self.holes) {
            text.push_str(literal);
            match hole {
                Hole::Value(value) => {
                    text.push_str(&params.next());
                    values.push(value.clone());
                }
                Hole::Fragment(fragment) => {
                    let inner = fragment.render(params);
                    text.push_str(&inner.text);
                    values.extend(inner.values);
                }
            }
        }
        if let Some(last) = self.literals.last() {
            text.push_str(last);
        }
        SqlFragment { text, values }
    }

    /// Render as a top-level statement: fresh generator, normalized whitespace.
    pub fn to_sql(&self) -> SqlFragment {
        self.render(&mut ParamGenerator::new()).normalized()
    }
}

impl From<Fragment> for Template {
    fn from(fragment: Fragment) -> Self {
        match fragment {
            Fragment::Template(template) => template,
            other => Template::embedding(other),
        }
    }
}
