use rand::Rng;
use rand::seq::index;

/// 无放回均匀抽取 min(count, len) 个不重复的获奖者
pub fn select_winners<T: Clone>(eligible: &[T], count: i64) -> Vec<T> {
    let mut rng = rand::thread_rng();
    select_winners_with(&mut rng, eligible, count)
}

pub fn select_winners_with<T: Clone, R: Rng + ?Sized>(
    rng: &mut R,
    eligible: &[T],
    count: i64,
) -> Vec<T> {
    if count <= 0 || eligible.is_empty() {
        return Vec::new();
    }
    let amount = usize::try_from(count)
        .unwrap_or(usize::MAX)
        .min(eligible.len());

    index::sample(rng, eligible.len(), amount)
        .into_iter()
        .map(|i| eligible[i].clone())
        .collect()
}
