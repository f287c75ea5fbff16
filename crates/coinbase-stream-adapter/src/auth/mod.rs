/*
[INPUT]:  Signing callback and API credentials
[OUTPUT]: Signed subscription parameters and auth errors
[POS]:    Auth layer - authenticates channel subscriptions
[UPDATE]: When auth flow or signature methods change
*/

pub mod adapter;
pub mod signer;

pub use adapter::SignerAdapter;
pub use signer::{HmacSigner, MockSigner, RequestSigner, SignRequest, Signature};
