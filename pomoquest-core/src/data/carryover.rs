use super::DataStore;
use crate::models::Quest;

/// An active quest left behind on an earlier day.
#[derive(Debug, Clone, PartialEq)]
pub struct CarryoverQuest {
    /// Key of the record still holding the quest
    pub date: String,
    pub quest: Quest,
}

impl DataStore {
    /// The most recent active quest held by a day other than today.
    pub fn yesterday_quest(&self) -> Option<CarryoverQuest> {
        let data = self.lock();
        let today = data.date_key(self.clock.now());
        data.stale_active_quest(&today)
            .map(|(date, quest)| CarryoverQuest {
                date: date.to_string(),
                quest: quest.clone(),
            })
    }

    /// Drops the left-behind quest. Returns false when there was none.
    pub fn dismiss_yesterday_quest(&self) -> bool {
        self.commit(|data, now| {
            let today = data.date_key(now);
            let Some(date) = data.stale_active_quest(&today).map(|(d, _)| d.to_string()) else {
                return false;
            };
            data.take_active_quest(&date, now).is_some()
        })
    }

    /// Moves the left-behind quest into today's slot, restarting its clock.
    /// Returns false when there was none.
    pub fn move_yesterday_quest_to_today(&self) -> bool {
        self.commit(|data, now| {
            let today = data.date_key(now);
            let Some(date) = data.stale_active_quest(&today).map(|(d, _)| d.to_string()) else {
                return false;
            };
            let Some(mut quest) = data.take_active_quest(&date, now) else {
                return false;
            };
            tracing::debug!("Moving quest from {} to {}", date, today);
            quest.created_at = now;
            data.record_mut(&today, now).active_quest = Some(quest);
            true
        })
    }
}
