//! Include, exclude and rename row fields

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use contracts::{CapturedEvent, ContractError, Row, Transform};

use crate::{envelope, invalid_param, list_param};

#[derive(Debug, Clone, Default)]
pub struct ReplaceField {
    name: String,
    /// Whitelist, applied after renames
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
    renames: Vec<(String, String)>,
}

impl ReplaceField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.push((from.into(), to.into()));
        self
    }

    pub(crate) fn from_params(
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let mut replace = Self::new(name);

        let include = list_param(params, "include");
        if !include.is_empty() {
            replace = replace.include(include);
        }
        replace = replace.exclude(list_param(params, "exclude"));

        for pair in list_param(params, "rename") {
            let (from, to) = pair
                .split_once(':')
                .map(|(f, t)| (f.trim(), t.trim()))
                .filter(|(f, t)| !f.is_empty() && !t.is_empty())
                .ok_or_else(|| {
                    invalid_param(name, "rename", format!("'{pair}' is not 'old:new'"))
                })?;
            replace = replace.rename(from, to);
        }
        Ok(replace)
    }

    fn replace_row(&self, mut row: Row) -> Row {
        for (old, new) in &self.renames {
            if let Some(value) = row.remove(old) {
                row.insert(new.clone(), value);
            }
        }
        if let Some(include) = &self.include {
            row.retain(|key, _| include.contains(key));
        }
        for field in &self.exclude {
            row.remove(field);
        }
        row
    }
}

impl Transform for ReplaceField {
    fn name(&self) -> &str {
        &self.name
    }

    fn map(&self, event: &CapturedEvent) -> Result<Bytes, ContractError> {
        envelope(event, self.replace_row(event.row.clone()))
    }
}
