use dcprovision_directory::DirectoryError;
use dcprovision_template::TemplateError;
use thiserror::Error;

/// A failed provisioning operation
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Naming input is malformed or disagrees with the existing configuration
    #[error("Invalid configuration: {field} {rule}")]
    InvalidConfiguration {
        /// The configuration field at fault
        field: String,
        /// The rule it violates
        rule: String,
    },

    /// A NetBIOS name or DNS domain is not acceptable
    #[error("Invalid name \"{name}\": {rule}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// The rule it violates
        rule: String,
    },

    /// A template references a variable with no value
    #[error("Undefined variable '{variable}' in template '{template}'")]
    MissingVariable {
        /// The unbound placeholder name
        variable: String,
        /// The template being rendered
        template: String,
    },

    /// A template contains a malformed placeholder
    #[error("Malformed template '{template}':\n{message}")]
    MalformedTemplate {
        /// The template being parsed
        template: String,
        /// The formatted parse error
        message: String,
    },

    /// The directory store refused an operation
    #[error("{target}: {message}")]
    DirectoryOperationFailed {
        /// The database, record or file affected
        target: String,
        /// The store's own description of the failure
        message: String,
    },

    /// A partition could not be emptied within the iteration budget
    #[error("Erasing {basedn} did not converge after {iterations} iterations ({})", remaining_text(.remaining))]
    ConvergenceIncomplete {
        /// The root of the partition
        basedn: String,
        /// How many passes were made
        iterations: usize,
        /// How many records were left, if the last search succeeded
        remaining: Option<usize>,
    },

    /// A required identity could not be determined from the environment
    #[error("Insufficient environment: {0}")]
    InsufficientEnvironment(String),

    /// A commit failed after its changes were loaded
    #[error("Committing {database} failed: {message}")]
    TransactionFailed {
        /// The database being committed
        database: String,
        /// The store's own description of the failure
        message: String,
    },

    /// The keytabs could not be refreshed
    #[error("Failed to refresh keytabs: {0}")]
    CredentialRefreshFailed(String),

    /// One or more security identifiers could not be mapped to local names
    #[error("Failed to set up {} name mappings:\n  {}", .failures.len(), .failures.join("\n  "))]
    NameMappingFailed {
        /// A description of each failed mapping
        failures: Vec<String>,
    },

    /// A file system or other collaborator failed
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn remaining_text(remaining: &Option<usize>) -> String {
    match remaining {
        Some(count) => format!("{count} records remain"),
        None => "the partition could not be searched".to_owned(),
    }
}

impl From<TemplateError> for ProvisionError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::MissingVariable { variable, template } => {
                ProvisionError::MissingVariable { variable, template }
            }
            TemplateError::Parse { template, message } => {
                ProvisionError::MalformedTemplate { template, message }
            }
        }
    }
}

impl ProvisionError {
    /// Wraps a directory error with the database, record or file it concerns
    pub fn directory(target: impl ToString, error: DirectoryError) -> Self {
        ProvisionError::DirectoryOperationFailed {
            target: target.to_string(),
            message: error.to_string(),
        }
    }

    /// Wraps a failed commit of `database`
    pub fn transaction(database: impl ToString, error: DirectoryError) -> Self {
        ProvisionError::TransactionFailed {
            database: database.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_errors_keep_their_kind() {
        let error: ProvisionError = TemplateError::MissingVariable {
            variable: "DOMAINDN".into(),
            template: "provision.ldif".into(),
        }
        .into();
        assert!(matches!(
            error,
            ProvisionError::MissingVariable { ref variable, .. } if variable == "DOMAINDN"
        ));
    }

    #[test]
    fn convergence_message() {
        let error = ProvisionError::ConvergenceIncomplete {
            basedn: "DC=example,DC=com".into(),
            iterations: 10,
            remaining: Some(1),
        };
        assert_eq!(
            error.to_string(),
            "Erasing DC=example,DC=com did not converge after 10 iterations (1 records remain)"
        );
    }
}
