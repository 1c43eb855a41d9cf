use dashmap::{DashMap, DashSet};

/// Network presence within one activity: network -> users, user -> networks.
#[derive(Default)]
pub struct Presence {
    network_to_users: DashMap<String, DashSet<String>>,
    user_to_networks: DashMap<String, DashSet<String>>,
}

impl Presence {
    pub fn new() -> Self {
        Self {
            network_to_users: DashMap::new(),
            user_to_networks: DashMap::new(),
        }
    }

    pub fn join(&self, network: &str, user: &str) {
        self.network_to_users
            .entry(network.to_string())
            .or_insert_with(DashSet::new)
            .insert(user.to_string());

        self.user_to_networks
            .entry(user.to_string())
            .or_insert_with(DashSet::new)
            .insert(network.to_string());
    }

    pub fn leave(&self, network: &str, user: &str) {
        if let Some(set) = self.network_to_users.get(network) {
            set.remove(user);
            if set.is_empty() {
                drop(set);
                self.network_to_users.remove(network);
            }
        }
        if let Some(set) = self.user_to_networks.get(user) {
            set.remove(network);
            if set.is_empty() {
                drop(set);
                self.user_to_networks.remove(user);
            }
        }
    }

    pub fn users_in(&self, network: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .network_to_users
            .get(network)
            .map(|set| set.iter().map(|u| u.key().to_string()).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Forget `user` everywhere; returns the networks it was in, sorted.
    pub fn cleanup_user(&self, user: &str) -> Vec<String> {
        let Some((_, networks)) = self.user_to_networks.remove(user) else {
            return Vec::new();
        };
        let mut left = Vec::with_capacity(networks.len());
        for n in networks.iter() {
            let network = n.key();
            if let Some(set) = self.network_to_users.get(network) {
                set.remove(user);
                if set.is_empty() {
                    drop(set);
                    self.network_to_users.remove(network);
                }
            }
            left.push(network.clone());
        }
        left.sort();
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_reports_every_network() {
        let p = Presence::new();
        p.join("video", "alice");
        p.join("audio", "alice");
        p.join("audio", "bob");

        assert_eq!(p.cleanup_user("alice"), vec!["audio", "video"]);
        assert_eq!(p.users_in("audio"), vec!["bob"]);
        assert!(p.users_in("video").is_empty());
        assert!(p.cleanup_user("alice").is_empty());
    }

    #[test]
    fn leave_is_scoped_to_one_network() {
        let p = Presence::new();
        p.join("video", "alice");
        p.join("audio", "alice");
        p.leave("video", "alice");
        assert_eq!(p.cleanup_user("alice"), vec!["audio"]);
    }
}
