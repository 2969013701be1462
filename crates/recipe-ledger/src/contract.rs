//! Bindings for the `RecipeStorage` contract on top of a loaded ABI.

use chain_eth::abi::{decode_result, encode_call, AbiFunction, AbiType};
use chain_eth::{AbiValue, ChainAddress, ContractAbi, EthError};
use chain_rpc::LogEntry;

use crate::record::{RecipeRecord, RecordShape};

pub const CREATE_RECIPE: &str = "createRecipe";
pub const GET_RECIPE: &str = "getRecipe";
pub const GET_CHEF_RECIPES: &str = "getChefRecipes";
pub const GET_RECIPE_COUNT: &str = "getRecipeCount";
pub const RECIPE_CREATED: &str = "RecipeCreated";

/// Result of decoding `getRecipe` output.
#[derive(Debug)]
pub(crate) enum RecipeLookup {
    Found(RecipeRecord),
    Missing,
}

#[derive(Debug, Clone)]
pub struct RecipeContract {
    abi: ContractAbi,
}

impl RecipeContract {
    /// Wraps a descriptor, checking it declares the calls every ledger needs.
    pub fn new(abi: ContractAbi) -> Result<Self, EthError> {
        for (name, arity) in [(CREATE_RECIPE, 3), (GET_RECIPE, 1)] {
            if abi.function_with_arity(name, arity).is_none() {
                return Err(EthError::AbiDescriptor(format!(
                    "descriptor has no {name} function taking {arity} argument(s)"
                )));
            }
        }
        Ok(Self { abi })
    }

    /// Deployed address recorded in the descriptor, if any.
    pub fn descriptor_address(&self) -> Option<ChainAddress> {
        self.abi.address
    }

    pub fn create_recipe_call(
        &self,
        name: &str,
        ingredients: &str,
        instructions: &str,
    ) -> Result<Vec<u8>, EthError> {
        encode_call(
            CREATE_RECIPE,
            &[name.into(), ingredients.into(), instructions.into()],
            &self.abi,
        )
    }

    pub fn get_recipe_call(&self, id: u64) -> Result<Vec<u8>, EthError> {
        encode_call(GET_RECIPE, &[id.into()], &self.abi)
    }

    pub(crate) fn decode_recipe(&self, id: u64, data: &[u8]) -> Result<RecipeLookup, EthError> {
        let values = self.function(GET_RECIPE, 1)?.decode_output(data)?;
        match RecipeRecord::from_abi(id, values) {
            Ok(record) => Ok(RecipeLookup::Found(record)),
            Err(RecordShape::Empty) => Ok(RecipeLookup::Missing),
            Err(RecordShape::Malformed(reason)) => Err(EthError::AbiDecoding(reason)),
        }
    }

    /// Call data for the owner's recipe ids and whether the owner must also be
    /// the caller.
    ///
    /// The deployed contract answers for `msg.sender`; a variant taking the
    /// owner as an `address` argument is used when the descriptor declares one.
    pub fn owned_ids_call(&self, owner: &ChainAddress) -> Result<(Vec<u8>, bool), EthError> {
        if let Some(f) = self.abi.function_with_arity(GET_CHEF_RECIPES, 1) {
            if f.input_types() == [AbiType::Address] {
                return Ok((f.encode_input(&[(*owner).into()])?, false));
            }
        }
        Ok((encode_call(GET_CHEF_RECIPES, &[], &self.abi)?, true))
    }

    pub fn decode_owned_ids(&self, data: &[u8]) -> Result<Vec<u64>, EthError> {
        let ids = decode_result(data, &[AbiType::Array(Box::new(AbiType::Uint(256)))])?
            .pop()
            .and_then(AbiValue::into_array)
            .ok_or_else(|| EthError::AbiDecoding("expected a uint256[]".into()))?;

        ids.iter()
            .map(|id| {
                id.as_u64()
                    .ok_or_else(|| EthError::AbiDecoding("recipe id does not fit in u64".into()))
            })
            .collect()
    }

    pub fn recipe_count_call(&self) -> Result<Vec<u8>, EthError> {
        encode_call(GET_RECIPE_COUNT, &[], &self.abi)
    }

    pub fn decode_recipe_count(&self, data: &[u8]) -> Result<u64, EthError> {
        self.function(GET_RECIPE_COUNT, 0)?
            .decode_output(data)?
            .first()
            .and_then(AbiValue::as_u64)
            .ok_or_else(|| EthError::AbiDecoding("recipe count is not a u64".into()))
    }

    /// Id of the recipe announced by a `RecipeCreated` log emitted by
    /// `contract`, if the logs contain one.
    pub fn created_recipe_id(
        &self,
        contract: &ChainAddress,
        logs: &[LogEntry],
    ) -> Result<Option<u64>, EthError> {
        let Some(event) = self.abi.event(RECIPE_CREATED) else {
            return Ok(None);
        };
        let topic = event.topic();

        let Some(log) = logs
            .iter()
            .find(|log| log.address == *contract && log.topics.first() == Some(&topic))
        else {
            return Ok(None);
        };

        event
            .decode_log(&log.topics, &log.data)?
            .into_iter()
            .find(|(name, _)| name == "id")
            .map(|(_, value)| {
                value
                    .as_u64()
                    .ok_or_else(|| EthError::AbiDecoding("recipe id does not fit in u64".into()))
            })
            .transpose()
    }

    fn function(&self, name: &str, arity: usize) -> Result<&AbiFunction, EthError> {
        self.abi
            .function_with_arity(name, arity)
            .ok_or_else(|| EthError::AbiDescriptor(format!("descriptor has no {name} function")))
    }
}
