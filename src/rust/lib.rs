//! Outcome prediction for CARF tax appeal rulings.
//!
//! A case is described by its tax type, its judging panel and the text of its
//! summary. Training fits two random forests over categorical codes and TF-IDF
//! text features: one for the disposition (provided in full, provided in part,
//! denied) and one for the voting type of provided cases. Everything inference
//! needs is stored in a single versioned [`ArtifactBundle`].
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use lexcarf::{runtime, ArtifactStore, CaseRecord, Predictor, VotingOutcome};
//!
//! let store = ArtifactStore::new_default()?;
//! let bundle = runtime::initialize(&store, "carf-2023")?;
//! let predictor = Predictor::new(bundle)?;
//!
//! let case = CaseRecord::new(
//!     "IRPJ",
//!     "3ª TURMA ORDINÁRIA",
//!     "Compensação de prejuízos fiscais. Trava de 30%.",
//! );
//! let prediction = predictor.predict(&case)?;
//! for (label, p) in prediction.disposition.sorted() {
//!     println!("{}: {:.1}%", label, p * 100.0);
//! }
//! if let VotingOutcome::Predicted(voting) = &prediction.voting {
//!     println!("Voting: {:?}", voting.top());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Training
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use lexcarf::{ArtifactStore, DatasetReader, TrainingPipeline, TrainingProfile};
//!
//! let train = DatasetReader::new("dados/carf_2023.csv").read_records()?;
//! let test = DatasetReader::new("dados/carf_2024.csv").read_records()?;
//!
//! let pipeline = TrainingPipeline::builder()
//!     .with_profile(TrainingProfile::CrossYear)
//!     .build()?;
//! let (bundle, report) = pipeline.fit(train, Some(test))?;
//!
//! ArtifactStore::new_default()?.save("carf-2023", &bundle)?;
//! println!("voting model trained: {}", report.voting_trained);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A bundle is immutable once built. [`Predictor`] holds it behind an `Arc`
//! and is `Send + Sync`, so one predictor can serve many threads.

pub mod artifact_store;
pub mod classifier;
pub mod config;
pub mod features;
pub mod forest;
pub mod record;
pub mod runtime;
pub mod training;

pub use artifact_store::{ArtifactError, ArtifactStore};
pub use classifier::{
    ArtifactBundle, CasePrediction, Distribution, EncodedCase, InputWarning, OutcomeClassifier, PredictionError,
    Predictor, VotingOutcome, BUNDLE_FORMAT_VERSION,
};
pub use config::{TrainingConfig, TrainingProfile};
pub use features::{CategoryEncoder, FeatureAssembler, FeatureSchema, TfidfVectorizer, VectorizerParams, OTHER_CATEGORY};
pub use forest::{ForestParams, RandomForest};
pub use record::{CaseRecord, Disposition, VotingType};
pub use training::{
    ClassificationReport, DatasetReader, Denylist, LeakageReport, TrainingError, TrainingPipeline, TrainingReport,
};

pub fn init_logger() {
    env_logger::init();
}
