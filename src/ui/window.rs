use std::cell::RefCell;
use std::rc::Rc;

use adw::prelude::*;
use relm4::prelude::*;

use crate::app::AppMsg;
use crate::config;
use crate::services::settings::{AppSettings, ColorScheme};

pub fn apply_color_scheme(scheme: ColorScheme) {
    let manager = adw::StyleManager::default();
    manager.set_color_scheme(match scheme {
        ColorScheme::System => adw::ColorScheme::Default,
        ColorScheme::Light => adw::ColorScheme::ForceLight,
        ColorScheme::Dark => adw::ColorScheme::ForceDark,
    });
}

thread_local! {
    static FONT_PROVIDER: RefCell<Option<gtk::CssProvider>> = const { RefCell::new(None) };
}

/// Overrides the bubble font size with a one-rule provider; replacing the
/// provider on each change keeps exactly one override active.
pub fn apply_message_font_size(size: u32) {
    let Some(display) = gtk::gdk::Display::default() else {
        return;
    };
    FONT_PROVIDER.with(|cell| {
        if let Some(old) = cell.borrow_mut().take() {
            gtk::style_context_remove_provider_for_display(&display, &old);
        }
        let provider = gtk::CssProvider::new();
        provider.load_from_string(&format!(
            ".message-bubble-user label, .message-bubble-bot label {{ font-size: {}pt; }}",
            size
        ));
        gtk::style_context_add_provider_for_display(
            &display,
            &provider,
            gtk::STYLE_PROVIDER_PRIORITY_APPLICATION + 1,
        );
        *cell.borrow_mut() = Some(provider);
    });
}

pub fn create_preferences_window(
    parent: &adw::ApplicationWindow,
    sender: &relm4::Sender<AppMsg>,
    settings: &AppSettings,
) -> adw::PreferencesWindow {
    let state = Rc::new(RefCell::new(settings.clone()));

    let window = adw::PreferencesWindow::new();
    window.set_title(Some("Preferences"));
    window.set_transient_for(Some(parent));
    window.set_modal(true);

    let page = adw::PreferencesPage::builder()
        .title("General")
        .icon_name("preferences-system-symbolic")
        .build();

    // --- Appearance ---
    let appearance = adw::PreferencesGroup::builder().title("Appearance").build();

    let scheme_row = adw::ComboRow::builder()
        .title("Color Scheme")
        .model(&gtk::StringList::new(&["System", "Light", "Dark"]))
        .build();
    scheme_row.set_selected(match settings.color_scheme {
        ColorScheme::System => 0,
        ColorScheme::Light => 1,
        ColorScheme::Dark => 2,
    });
    {
        let state = state.clone();
        let sender = sender.clone();
        scheme_row.connect_selected_notify(move |row| {
            let mut s = state.borrow_mut();
            s.color_scheme = match row.selected() {
                1 => ColorScheme::Light,
                2 => ColorScheme::Dark,
                _ => ColorScheme::System,
            };
            let _ = sender.send(AppMsg::SettingsChanged(s.clone()));
        });
    }
    appearance.add(&scheme_row);

    let font_row = adw::SpinRow::builder()
        .title("Message Font Size")
        .adjustment(&gtk::Adjustment::new(
            settings.message_font_size as f64,
            10.0,
            24.0,
            1.0,
            1.0,
            0.0,
        ))
        .build();
    {
        let state = state.clone();
        let sender = sender.clone();
        font_row.connect_value_notify(move |row| {
            let mut s = state.borrow_mut();
            s.message_font_size = row.value() as u32;
            let _ = sender.send(AppMsg::SettingsChanged(s.clone()));
        });
    }
    appearance.add(&font_row);
    page.add(&appearance);

    // --- Chat behavior ---
    let behavior = adw::PreferencesGroup::builder().title("Chat").build();

    let switches: [(&str, &str, fn(&AppSettings) -> bool, fn(&mut AppSettings, bool)); 6] = [
        (
            "Send with Enter",
            "Shift+Enter inserts a new line",
            |s| s.send_with_enter,
            |s, v| s.send_with_enter = v,
        ),
        (
            "Show Timestamps",
            "Show the time next to each message",
            |s| s.show_timestamps,
            |s, v| s.show_timestamps = v,
        ),
        (
            "Auto-scroll",
            "Follow new messages unless scrolled up",
            |s| s.auto_scroll,
            |s, v| s.auto_scroll = v,
        ),
        (
            "Celebrations",
            "Toast on message-count milestones",
            |s| s.celebrations,
            |s, v| s.celebrations = v,
        ),
        (
            "Typing Indicator",
            "Show when the assistant is typing",
            |s| s.typing_indicator,
            |s, v| s.typing_indicator = v,
        ),
        (
            "Sound Notifications",
            "Play a sound on new replies",
            |s| s.sound_notifications,
            |s, v| s.sound_notifications = v,
        ),
    ];

    for (title, subtitle, get, set) in switches {
        let row = adw::SwitchRow::builder()
            .title(title)
            .subtitle(subtitle)
            .active(get(settings))
            .build();
        let state = state.clone();
        let sender = sender.clone();
        row.connect_active_notify(move |row| {
            let mut s = state.borrow_mut();
            set(&mut s, row.is_active());
            let _ = sender.send(AppMsg::SettingsChanged(s.clone()));
        });
        behavior.add(&row);
    }
    page.add(&behavior);

    window.add(&page);
    window.present();
    window
}

pub fn create_shortcuts_window(parent: &adw::ApplicationWindow) {
    let window = gtk::ShortcutsWindow::builder()
        .transient_for(parent)
        .modal(true)
        .build();

    let general_group = gtk::ShortcutsGroup::builder().title("General").build();

    let new_chat = gtk::ShortcutsShortcut::builder()
        .title("New chat")
        .accelerator("<Control>n")
        .build();
    general_group.add_shortcut(&new_chat);

    let prefs = gtk::ShortcutsShortcut::builder()
        .title("Preferences")
        .accelerator("<Control>comma")
        .build();
    general_group.add_shortcut(&prefs);

    let shortcuts_help = gtk::ShortcutsShortcut::builder()
        .title("Keyboard shortcuts")
        .accelerator("<Control>slash")
        .build();
    general_group.add_shortcut(&shortcuts_help);

    let chat_group = gtk::ShortcutsGroup::builder().title("Chat").build();

    let send = gtk::ShortcutsShortcut::builder()
        .title("Send message")
        .accelerator("Return")
        .build();
    chat_group.add_shortcut(&send);

    let newline = gtk::ShortcutsShortcut::builder()
        .title("New line")
        .accelerator("<Shift>Return")
        .build();
    chat_group.add_shortcut(&newline);

    let search = gtk::ShortcutsShortcut::builder()
        .title("Search conversations")
        .accelerator("<Control>f")
        .build();
    chat_group.add_shortcut(&search);

    let section = gtk::ShortcutsSection::builder().title(config::APP_NAME).build();
    section.add_group(&general_group);
    section.add_group(&chat_group);

    window.add_section(&section);
    window.present();
}

pub fn create_about_dialog(parent: &adw::ApplicationWindow) {
    let about = adw::AboutWindow::builder()
        .application_name(config::APP_NAME)
        .version(config::VERSION)
        .developer_name("Parley Contributors")
        .license_type(gtk::License::Gpl30)
        .comments("A native GNOME chat client for conversational assistants")
        .application_icon(config::APP_ID)
        .build();
    about.set_transient_for(Some(parent));
    about.present();
}

/// Email/password prompt. Validation and the network call happen in the app
/// component; this dialog only collects input.
pub fn create_sign_in_dialog(parent: &adw::ApplicationWindow, sender: &relm4::Sender<AppMsg>) {
    let dialog = adw::AlertDialog::builder()
        .heading("Sign In")
        .body("Sign in to sync your identity across devices.")
        .build();

    let form = gtk::Box::builder()
        .orientation(gtk::Orientation::Vertical)
        .spacing(8)
        .build();

    let email_entry = gtk::Entry::builder()
        .placeholder_text("Email")
        .input_purpose(gtk::InputPurpose::Email)
        .activates_default(true)
        .build();
    form.append(&email_entry);

    let name_entry = gtk::Entry::builder()
        .placeholder_text("Full name (for registration)")
        .build();
    form.append(&name_entry);

    let password_entry = gtk::PasswordEntry::builder()
        .placeholder_text("Password")
        .show_peek_icon(true)
        .build();
    form.append(&password_entry);

    dialog.set_extra_child(Some(&form));
    dialog.add_response("cancel", "Cancel");
    dialog.add_response("register", "Register");
    dialog.add_response("login", "Sign In");
    dialog.set_response_appearance("login", adw::ResponseAppearance::Suggested);
    dialog.set_default_response(Some("login"));
    dialog.set_close_response("cancel");

    let sender = sender.clone();
    dialog.connect_response(None, move |_dialog, response| {
        let email = email_entry.text().to_string();
        let password = password_entry.text().to_string();
        match response {
            "login" => {
                let _ = sender.send(AppMsg::SignIn { email, password });
            }
            "register" => {
                let _ = sender.send(AppMsg::Register {
                    email,
                    password,
                    full_name: name_entry.text().to_string(),
                });
            }
            _ => {}
        }
    });

    dialog.present(Some(parent));
}
