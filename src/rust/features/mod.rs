mod assembler;
mod category;
mod tfidf;
mod utils;

pub use assembler::{FeatureAssembler, FeatureSchema, CATEGORICAL_FEATURES};
pub use category::{normalize_panel, CategoryEncoder, OTHER_CATEGORY};
pub use tfidf::{TfidfVectorizer, VectorizerParams};
pub use utils::truncate_chars;
