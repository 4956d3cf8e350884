pub mod cipher;
pub mod compression;
pub mod envelope;
pub mod signer;
pub mod subnet;

pub use cipher::{Decryptor, Encryptor};
pub use envelope::Envelope;
pub use signer::Signer;
pub use subnet::TrustedSubnet;
