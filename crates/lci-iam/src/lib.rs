//! External-interface contracts the transformation engine treats as
//! collaborators rather than internals: the IAM tensor container, per-sector
//! recipe files, the biosphere flow dictionary, and the validation log's
//! exit-contract shape.

pub mod biosphere;
pub mod recipes;
pub mod tensor;
pub mod validation;

pub use biosphere::{BiosphereDictionary, StaticBiosphereDictionary};
pub use recipes::{
    AncillaryExchange, Blacklist, Co2PairRecipe, EcoinventAliases, EfficiencyRecipe, MarketRecipe,
    SectorRecipe, load_recipe_from_path, load_recipes_from_dir, order_sectors,
};
pub use tensor::{IamDataCollection, InMemoryIamData, Tensor4};
pub use validation::{ValidationRecord, write_ndjson};
