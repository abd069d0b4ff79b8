use crate::models::{Participant, Snowflake};

/// 按身份组过滤参与者；无要求时原样返回（保持顺序）
pub fn filter_eligible(
    participants: Vec<Participant>,
    required_role: Option<Snowflake>,
) -> Vec<Participant> {
    match required_role {
        None => participants,
        Some(role) => participants
            .into_iter()
            .filter(|p| p.has_role(role))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(user_id: u64, roles: &[u64]) -> Participant {
        Participant {
            user_id,
            display_name: format!("user{user_id}"),
            roles: roles.to_vec(),
        }
    }

    fn sample() -> Vec<Participant> {
        vec![
            participant(1, &[10]),
            participant(2, &[]),
            participant(3, &[10, 20]),
            participant(4, &[20]),
        ]
    }

    #[test]
    fn test_no_requirement_keeps_everyone_in_order() {
        let all = sample();
        assert_eq!(filter_eligible(all.clone(), None), all);
    }

    #[test]
    fn test_requirement_is_ordered_subsequence() {
        let all = sample();
        let eligible = filter_eligible(all.clone(), Some(10));
        let ids: Vec<u64> = eligible.iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(eligible.iter().all(|p| p.has_role(10)));
        // 被排除的都没有该身份组
        assert!(
            all.iter()
                .filter(|p| !ids.contains(&p.user_id))
                .all(|p| !p.has_role(10))
        );
    }

    #[test]
    fn test_unknown_role_and_empty_input() {
        assert!(filter_eligible(sample(), Some(99)).is_empty());
        assert!(filter_eligible(Vec::new(), Some(10)).is_empty());
        assert!(filter_eligible(Vec::new(), None).is_empty());
    }
}
