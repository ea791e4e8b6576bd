//! User-facing text.

pub const MENU: &str = "Choose an option:";

pub const HELP: &str = "Welcome to the Chat Bot! Here are the available commands:\n\
/start - Show the main menu\n\
/help - Show this help message\n\
/cancel - Cancel registration or search\n\n\
Main Menu Options:\n\
1. Register - Register your profile\n\
2. Search for Match - Find a chat match\n\
3. Disconnect - Disconnect from the current chat\n\n\
To start, use the main menu to select an option.";

pub const ASK_PHOTO: &str = "Hi! Send me your profile picture.";
pub const ASK_SEX: &str = "Got it! Now tell me your sex:";
pub const ASK_PREFERRED_SEX: &str = "Who would you like to be matched with?";
pub const ASK_BIRTHDAY: &str = "Great! Now send me your birthday (YYYY-MM-DD).";
pub const ASK_LOCATION: &str = "Please share your location.";
pub const REGISTERED: &str = "Thank you! Your information has been saved.";
pub const SEX_OPTIONS: [&str; 2] = ["Male", "Female"];

pub const INVALID_PHOTO: &str = "Please send a photo.";
pub const INVALID_SEX: &str = "Please select \"Male\" or \"Female\" using the buttons.";
pub const INVALID_BIRTHDAY: &str = "Please send your birthday as text.";
pub const INVALID_LOCATION: &str = "Please share your location using the button.";

pub const ASK_SCOPE: &str = "Where should I look for your match?";
pub const INVALID_SCOPE: &str = "Please pick one of the search options.";

pub const CANCELLED: &str = "Operation cancelled.";
pub const INVALID_MENU_OPTION: &str = "Please choose a valid option from the menu.";
pub const NOT_REGISTERED: &str = "You need to register first. Use the main menu to start.";
pub const ALREADY_REGISTERED: &str = "You are already registered.";
pub const NO_MATCH: &str = "No match found.";
pub const NO_ACTIVE_CHAT: &str = "No active chat. Use the main menu to find a match.";
pub const NOTHING_TO_DISCONNECT: &str = "No active chat to disconnect from.";
pub const DISCONNECTED: &str = "You have disconnected. Use the main menu to find a new match.";
pub const PARTNER_DISCONNECTED: &str =
    "The other user has disconnected. Use the main menu to find a new match.";
pub const ALREADY_IN_CHAT: &str = "You are already in a chat. Disconnect first to search again.";
pub const PARTNER_UNAVAILABLE: &str = "That match is no longer available. Please search again.";
pub const VIEW_FORBIDDEN: &str = "You cannot view that profile.";
pub const VIEW_PROFILE: &str = "View profile";
pub const STORE_FAILURE: &str = "Something went wrong. Please try again.";

pub fn matched_with(name: &str) -> String {
    format!("Matched with {}. You can start chatting now.", name)
}

pub fn profile_card(name: &str, sex: &str, birthday: &str) -> String {
    format!("{}\nSex: {}\nBirthday: {}", name, sex, birthday)
}
