//! Password protection via qpdf (AES-256, revision 6)

use crate::error::{Error, Result};
use crate::pdf::objects::map_qpdf_error;
use qpdf::{EncryptionParams, EncryptionParamsR6, PrintPermission, QPdf};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Print permission level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrintLevel {
    None,
    Low,
    #[default]
    Full,
}

/// Permission flags written into the encryption dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Permissions {
    pub print: PrintLevel,
    /// Allow copying text and images
    pub copy: bool,
    /// Allow assembling, annotating, filling forms and other edits
    pub modify: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            print: PrintLevel::Full,
            copy: true,
            modify: true,
        }
    }
}

/// Open with an optional password, telling "needs a password" apart from "wrong password".
fn open(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd).map_err(map_qpdf_error),
        None => QPdf::read_from_memory(data).map_err(|e| match map_qpdf_error(e) {
            Error::IncorrectPassword => Error::PasswordRequired,
            other => other,
        }),
    }
}

/// Encrypt `data` so it opens with `user_password`.
///
/// `owner_password` defaults to the user password. `source_password` opens
/// an input that is already encrypted.
pub fn encrypt(
    data: &[u8],
    user_password: &str,
    owner_password: Option<&str>,
    permissions: Permissions,
    source_password: Option<&str>,
) -> Result<Vec<u8>> {
    if user_password.is_empty() {
        return Err(Error::validation("user password must not be empty"));
    }
    let qpdf = open(data, source_password)?;

    let allow_print = match permissions.print {
        PrintLevel::None => PrintPermission::None,
        PrintLevel::Low => PrintPermission::Low,
        PrintLevel::Full => PrintPermission::Full,
    };

    let encryption = EncryptionParams::R6(EncryptionParamsR6 {
        user_password: user_password.to_string(),
        owner_password: owner_password.unwrap_or(user_password).to_string(),
        allow_accessibility: true,
        allow_extract: permissions.copy,
        allow_assemble: permissions.modify,
        allow_annotate_and_form: permissions.modify,
        allow_form_filling: permissions.modify,
        allow_modify_other: permissions.modify,
        allow_print,
        encrypt_metadata: true,
    });

    let mut writer = qpdf.writer();
    writer
        .preserve_encryption(false)
        .encryption_params(encryption);
    writer.write_to_memory().map_err(|e| Error::Serialization {
        reason: e.to_string(),
    })
}

/// Remove password protection.
pub fn decrypt(data: &[u8], password: &str) -> Result<Vec<u8>> {
    let qpdf = open(data, Some(password))?;
    let mut writer = qpdf.writer();
    writer.preserve_encryption(false);
    writer.write_to_memory().map_err(|e| Error::Serialization {
        reason: e.to_string(),
    })
}

/// True when the file carries an `/Encrypt` dictionary
pub fn is_encrypted(data: &[u8]) -> Result<bool> {
    match QPdf::read_from_memory(data) {
        Ok(qpdf) => Ok(qpdf.is_encrypted()),
        Err(e) => match map_qpdf_error(e) {
            Error::IncorrectPassword => Ok(true),
            other => Err(other),
        },
    }
}
