//! Points, experience and levels.
//!
//! Every award adds the same amount to points and experience, recomputes
//! the level, flushes the totals to the store and broadcasts a
//! [`ProgressChange`]. Totals are written as absolute values: two awards
//! racing on the same user resolve as last write wins.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{ProgressChange, User, level_for_experience};
use crate::storage::Storage;

/// Channel carrying progression updates to whoever is listening.
pub type ProgressSender = broadcast::Sender<ProgressChange>;

/// Add experience and raise the level if the new total warrants it.
///
/// Returns `true` on level-up. Does not touch the store.
pub fn award_experience(user: &mut User, experience: i64, notifier: &ProgressSender) -> bool {
    user.experience += experience;

    let level = level_for_experience(user.experience);
    let leveled_up = level > user.level;
    if leveled_up {
        user.level = level;
        info!(user_id = %user.id, level, "User reached a new level");
    }

    notify(notifier, user);
    leveled_up
}

/// Award points (and the same amount of experience), then persist.
pub async fn award_points(
    storage: &Storage,
    notifier: &ProgressSender,
    user: &mut User,
    points: i64,
) -> Result<()> {
    user.total_points += points;
    award_experience(user, points, notifier);

    storage.update_progress(user).await?;
    notify(notifier, user);

    Ok(())
}

fn notify(notifier: &ProgressSender, user: &User) {
    // No subscribers is not an error.
    if notifier.send(ProgressChange::from(user)).is_err() {
        debug!(user_id = %user.id, "No progress listeners");
    }
}
