use chain_eth::{AbiValue, ChainAddress};
use serde::Serialize;

/// A recipe as stored on the ledger. Records are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeRecord {
    pub id: u64,
    pub name: String,
    pub ingredients: String,
    pub instructions: String,
    pub owner: ChainAddress,
    /// Block timestamp of creation, unix seconds.
    pub created_at: u64,
}

/// Why `getRecipe` output could not become a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordShape {
    /// Well-formed output describing no recipe (zero owner).
    Empty,
    Malformed(String),
}

impl RecipeRecord {
    /// Converts decoded `getRecipe` output into a record.
    ///
    /// Accepts the five values `(name, ingredients, instructions, owner,
    /// created_at)` either flat or wrapped in a single tuple.
    pub(crate) fn from_abi(id: u64, values: Vec<AbiValue>) -> Result<Self, RecordShape> {
        let fields = match <[AbiValue; 1]>::try_from(values) {
            Ok([AbiValue::Tuple(inner)]) => inner,
            Ok([other]) => vec![other],
            Err(flat) => flat,
        };

        let [name, ingredients, instructions, owner, created_at] =
            <[AbiValue; 5]>::try_from(fields).map_err(|fields| {
                RecordShape::Malformed(format!("expected 5 recipe fields, got {}", fields.len()))
            })?;

        let owner = owner
            .as_address()
            .ok_or_else(|| RecordShape::Malformed("owner is not an address".into()))?;
        if owner.is_zero() {
            return Err(RecordShape::Empty);
        }

        Ok(Self {
            id,
            name: text(name, "name")?,
            ingredients: text(ingredients, "ingredients")?,
            instructions: text(instructions, "instructions")?,
            owner,
            created_at: created_at
                .as_u64()
                .ok_or_else(|| RecordShape::Malformed("timestamp is not a u64".into()))?,
        })
    }
}

fn text(value: AbiValue, field: &str) -> Result<String, RecordShape> {
    value
        .into_string()
        .ok_or_else(|| RecordShape::Malformed(format!("{field} is not a string")))
}
