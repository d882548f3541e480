//! Deterministic names for object-literal descriptors.
//!
//! A structural literal like `{ x: i32; y: i32 }` has no name the generated
//! code could declare once and reuse. [`ShapeRegistry`] assigns one derived
//! from the property names (`Shape_x_y`), reusing it for identical shapes and
//! suffixing it (`Shape_x_y_2`) for different shapes with the same names.

use indexmap::IndexMap;

use crate::descriptor::TypeDesc;

const SHAPE_PREFIX: &str = "Shape";

/// Synthesized shape names in first-registration order.
#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    shapes: IndexMap<String, TypeDesc>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Replaces every object literal in `desc` by its synthesized name,
    /// registering shapes bottom-up so nested literals are named first.
    pub fn name_shapes(&mut self, desc: &TypeDesc) -> TypeDesc {
        match desc {
            TypeDesc::Plain(_) => desc.clone(),
            TypeDesc::Array(elem) => TypeDesc::Array(Box::new(self.name_shapes(elem))),
            TypeDesc::Tuple(items) => {
                TypeDesc::Tuple(items.iter().map(|i| self.name_shapes(i)).collect())
            }
            TypeDesc::Generic { name, args } => TypeDesc::Generic {
                name: name.clone(),
                args: args.iter().map(|a| self.name_shapes(a)).collect(),
            },
            TypeDesc::Union(members) => {
                TypeDesc::Union(members.iter().map(|m| self.name_shapes(m)).collect())
            }
            TypeDesc::Object(props) => {
                let props = props
                    .iter()
                    .map(|p| {
                        let mut p = p.clone();
                        p.ty = self.name_shapes(&p.ty);
                        p
                    })
                    .collect();
                TypeDesc::Plain(self.register(TypeDesc::Object(props)))
            }
        }
    }

    /// Returns the name of `shape`, allocating one if it is new.
    fn register(&mut self, shape: TypeDesc) -> String {
        if let Some((name, _)) = self.shapes.iter().find(|(_, known)| **known == shape) {
            return name.clone();
        }

        let base = base_name(&shape);
        let mut name = base.clone();
        let mut suffix = 2;
        while self.shapes.contains_key(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.shapes.insert(name.clone(), shape);
        name
    }

    /// `(name, object descriptor)` pairs in registration order.
    pub fn declarations(&self) -> impl Iterator<Item = (&str, &TypeDesc)> {
        self.shapes.iter().map(|(name, shape)| (name.as_str(), shape))
    }
}

fn base_name(shape: &TypeDesc) -> String {
    let mut name = String::from(SHAPE_PREFIX);
    if let TypeDesc::Object(props) = shape {
        for prop in props {
            name.push('_');
            name.extend(
                prop.name
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
            );
        }
    }
    name
}
