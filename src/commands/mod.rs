pub mod birthday;
pub mod chat;
pub mod membercount;
pub mod music;

use crate::{Data, Error};

/// Every command the bot registers, as prefix and slash commands.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        chat::ask(),
        music::play(),
        music::join(),
        music::stop(),
        music::skip(),
        music::pause(),
        music::queue(),
        music::leave(),
        birthday::birthday(),
        membercount::setmembercount(),
        membercount::stopmembercount(),
    ]
}
