//! Static agent personas, loaded once from configuration

use agent_hub_common::{AgentId, AgentProfile, HubError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, AgentProfile>,
}

impl AgentRegistry {
    pub fn from_profiles(profiles: Vec<AgentProfile>) -> Result<Self> {
        let mut agents = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            let id = profile.id.clone();
            if agents.insert(id.clone(), profile).is_some() {
                return Err(HubError::config(format!("duplicate agent id '{}'", id)));
            }
        }
        Ok(Self { agents })
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentProfile> {
        self.agents.get(id)
    }

    /// All profiles ordered by id
    pub fn list(&self) -> Vec<&AgentProfile> {
        let mut profiles: Vec<_> = self.agents.values().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    /// Look up every id in order, failing on the first unknown one
    pub fn resolve(&self, ids: &[AgentId]) -> Result<Vec<AgentProfile>> {
        ids.iter()
            .map(|id| {
                self.get(id)
                    .cloned()
                    .ok_or_else(|| HubError::UnknownAgent(id.to_string()))
            })
            .collect()
    }
}
