use serenity::all::{Role, RoleId};
use std::collections::HashMap;

/// One rung of the role ladder.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleRank {
    pub id: RoleId,
    pub name: String,
}

/// Value snapshot of a guild's role ladder, ascending by rank.
///
/// Discord owns the live role list and can reorder it at any time, so a
/// ladder is captured fresh for each evaluation and never held across
/// platform calls that could mutate it.
#[derive(Clone, Debug)]
pub struct RoleLadder {
    roles: Vec<RoleRank>,
}

impl RoleLadder {
    /// Build from an already-ascending list of rungs.
    pub fn new(roles: Vec<RoleRank>) -> Self {
        Self { roles }
    }

    /// Snapshot a guild's roles, ascending by position. Managed roles (bot
    /// integration roles) are not promotion targets and are skipped;
    /// `@everyone` stays at the bottom so untracked members start at rank 0.
    pub fn from_guild_roles(roles: &HashMap<RoleId, Role>) -> Self {
        let mut ladder: Vec<&Role> = roles.values().filter(|role| !role.managed).collect();
        ladder.sort_by_key(|role| (role.position, role.id));

        Self {
            roles: ladder
                .into_iter()
                .map(|role| RoleRank {
                    id: role.id,
                    name: role.name.clone(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn rank_of(&self, id: RoleId) -> Option<usize> {
        self.roles.iter().position(|role| role.id == id)
    }

    pub fn get(&self, rank: usize) -> Option<&RoleRank> {
        self.roles.get(rank)
    }

    /// Highest-ranked rung the member holds. Members whose roles are all
    /// outside the ladder sit at the bottom rung.
    pub fn highest_of(&self, member_roles: &[RoleId]) -> Option<&RoleRank> {
        self.roles
            .iter()
            .rev()
            .find(|rung| member_roles.contains(&rung.id))
            .or_else(|| self.roles.first())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn ladder(names: &[&str]) -> RoleLadder {
        RoleLadder::new(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| RoleRank {
                    id: RoleId::new(i as u64 + 1),
                    name: name.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn rank_matches_position() {
        let l = ladder(&["everyone", "recruit", "regular", "veteran"]);
        assert_eq!(l.rank_of(RoleId::new(1)), Some(0));
        assert_eq!(l.rank_of(RoleId::new(4)), Some(3));
        assert_eq!(l.rank_of(RoleId::new(99)), None);
    }

    #[test]
    fn highest_of_prefers_top_rung() {
        let l = ladder(&["everyone", "recruit", "regular"]);
        let held = [RoleId::new(2), RoleId::new(3)];
        assert_eq!(l.highest_of(&held).unwrap().name, "regular");
    }

    #[test]
    fn roleless_member_sits_at_the_bottom() {
        let l = ladder(&["everyone", "recruit"]);
        assert_eq!(l.highest_of(&[]).unwrap().name, "everyone");
    }
}
