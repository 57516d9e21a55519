use std::path::PathBuf;
use std::sync::Arc;

use adw::prelude::*;
use chrono::Utc;
use relm4::prelude::*;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::auth::{validate_email, validate_password};
use crate::api::types::{LoginRequest, RegisterRequest};
use crate::api::{ApiError, AuthApi, ChatApi};
use crate::config;
use crate::models::{ChatSession, ConnectionState, Message, Sender, UserIdentity};
use crate::realtime::{RealtimeClient, RealtimeEvent, RealtimeHandle, WsConnector};
use crate::services::chat::{self, SendOutcome};
use crate::services::settings::AppSettings;
use crate::services::sessions::truncate_title;
use crate::services::{export, AuthService, Database, KeyringService, SettingsService};
use crate::store::{Celebration, ChatStore};
use crate::ui::chat_view::{ChatView, ChatViewMsg, ChatViewOutput};
use crate::ui::sidebar::{Sidebar, SidebarMsg, SidebarOutput};
use crate::ui::window::{apply_color_scheme, apply_message_font_size};

const USER_IDENTIFIER_KEY: &str = "user_identifier";

/// Starter prompts shown on the empty page; clicking one sends it as the
/// first message of a fresh conversation.
const STARTER_PROMPTS: [(&str, &str); 6] = [
    ("Explain a concept", "Explain quantum computing in simple terms"),
    ("Get product info", "What are your pricing plans?"),
    ("Technical support", "How do I integrate your API?"),
    ("Compare options", "Compare machine learning vs deep learning"),
    ("Creative help", "Help me brainstorm marketing ideas"),
    ("Documentation", "Show me getting started guide"),
];

pub struct App {
    db: Database,
    keyring: Option<KeyringService>,
    api: Option<ChatApi>,
    auth_api: Option<AuthApi>,
    realtime: Option<RealtimeHandle>,
    store: ChatStore,
    identity: Option<UserIdentity>,
    user_identifier: String,
    sidebar: Controller<Sidebar>,
    chat_view: Controller<ChatView>,
    toast_overlay: adw::ToastOverlay,
    content_stack: gtk::Stack,
    connection_label: gtk::Label,
    preferences_window: Option<adw::PreferencesWindow>,
    settings: AppSettings,
}

#[derive(Debug)]
pub enum AppMsg {
    NewChat,
    SessionSelected(String),
    DeleteSession(String),
    RenameSession(String, String), // id, new title
    ExportSession(String),
    ExportSessionToFile(String, PathBuf),
    TogglePin(String, bool),
    ClearAllSessions,
    SendMessage(String),
    TypingChanged(bool),
    InitComplete(Database, KeyringService),
    InitFailed(String),
    ShowToast(String),
    ShowPreferences,
    ShowAbout,
    ShowShortcuts,
    ShowSignIn,
    SignIn {
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
        full_name: String,
    },
    SignOut,
    SettingsChanged(AppSettings),
}

#[derive(Debug)]
pub enum AppCmd {
    Initialized(Database, KeyringService),
    InitFailed(String),
    SessionsLoaded(Vec<ChatSession>),
    MessagesLoaded(String, Vec<Message>),
    RealtimeStarted(RealtimeHandle),
    Realtime(RealtimeEvent),
    BotReply(Message),
    SendFailed(String, ApiError), // session_id, error
    AuthResult(Result<(UserIdentity, String), ApiError>),
    IdentityRestored(UserIdentity),
    SettingsLoaded(AppSettings),
    BackendHealth(bool),
    ExportFinished(Result<PathBuf, String>),
    ChatError(String),
}

#[relm4::component(pub, async)]
impl AsyncComponent for App {
    type Init = ();
    type Input = AppMsg;
    type Output = ();
    type CommandOutput = AppCmd;

    view! {
        adw::ApplicationWindow {
            set_title: Some(config::APP_NAME),
            set_default_width: 1100,
            set_default_height: 760,
            set_width_request: 620,
            set_height_request: 480,

            #[local_ref]
            toast_overlay -> adw::ToastOverlay {},
        }
    }

    async fn init(
        _init: Self::Init,
        root: Self::Root,
        sender: AsyncComponentSender<Self>,
    ) -> AsyncComponentParts<Self> {
        root.set_default_size(1100, 760);

        let sidebar = Sidebar::builder()
            .launch(())
            .forward(sender.input_sender(), |output| match output {
                SidebarOutput::NewChat => AppMsg::NewChat,
                SidebarOutput::SessionSelected(id) => AppMsg::SessionSelected(id),
                SidebarOutput::DeleteSession(id) => AppMsg::DeleteSession(id),
                SidebarOutput::RenameSession(id, title) => AppMsg::RenameSession(id, title),
                SidebarOutput::ExportSession(id) => AppMsg::ExportSession(id),
                SidebarOutput::TogglePin(id, pinned) => AppMsg::TogglePin(id, pinned),
                SidebarOutput::ClearAll => AppMsg::ClearAllSessions,
            });

        let chat_view = ChatView::builder()
            .launch(())
            .forward(sender.input_sender(), |output| match output {
                ChatViewOutput::SendMessage(text) => AppMsg::SendMessage(text),
                ChatViewOutput::Typing(active) => AppMsg::TypingChanged(active),
            });

        let toast_overlay = adw::ToastOverlay::new();
        toast_overlay.set_hexpand(true);
        toast_overlay.set_vexpand(true);

        // Content stack: empty-state welcome page and the chat page
        let content_stack = gtk::Stack::new();
        content_stack.set_hexpand(true);
        content_stack.set_vexpand(true);

        let empty_page = adw::StatusPage::new();
        empty_page.set_title("Start a Conversation");
        empty_page.set_description(Some("Ask anything — the assistant is listening"));
        empty_page.set_icon_name(Some("chat-symbolic"));
        let new_chat_btn = gtk::Button::builder()
            .label("New Chat")
            .halign(gtk::Align::Center)
            .build();
        new_chat_btn.add_css_class("suggested-action");
        new_chat_btn.add_css_class("pill");
        let sender_btn = sender.input_sender().clone();
        new_chat_btn.connect_clicked(move |_| {
            sender_btn.send(AppMsg::NewChat).unwrap();
        });

        let prompt_grid = gtk::FlowBox::builder()
            .selection_mode(gtk::SelectionMode::None)
            .min_children_per_line(1)
            .max_children_per_line(3)
            .column_spacing(8)
            .row_spacing(8)
            .homogeneous(true)
            .halign(gtk::Align::Center)
            .build();
        for (title, text) in STARTER_PROMPTS {
            let inner = gtk::Box::new(gtk::Orientation::Vertical, 2);
            let title_label = gtk::Label::builder()
                .label(title)
                .halign(gtk::Align::Start)
                .build();
            title_label.add_css_class("heading");
            inner.append(&title_label);
            let text_label = gtk::Label::builder()
                .label(text)
                .halign(gtk::Align::Start)
                .wrap(true)
                .build();
            text_label.add_css_class("dim-label");
            text_label.add_css_class("caption");
            inner.append(&text_label);

            let prompt_btn = gtk::Button::builder().child(&inner).build();
            prompt_btn.add_css_class("card");
            prompt_btn.add_css_class("starter-prompt");
            let sender_prompt = sender.input_sender().clone();
            prompt_btn.connect_clicked(move |_| {
                sender_prompt
                    .send(AppMsg::SendMessage(text.to_string()))
                    .unwrap();
            });
            prompt_grid.insert(&prompt_btn, -1);
        }

        let empty_child = gtk::Box::new(gtk::Orientation::Vertical, 20);
        empty_child.set_halign(gtk::Align::Center);
        empty_child.append(&new_chat_btn);
        empty_child.append(&prompt_grid);
        empty_page.set_child(Some(&empty_child));
        content_stack.add_named(&empty_page, Some("empty"));

        let chat_box = gtk::Box::new(gtk::Orientation::Vertical, 0);
        chat_box.set_hexpand(true);
        chat_box.set_vexpand(true);
        chat_box.append(chat_view.widget());
        content_stack.add_named(&chat_box, Some("chat"));

        content_stack.set_visible_child_name("empty");

        // Content header with the connection indicator
        let content_header = adw::HeaderBar::new();
        content_header.set_show_start_title_buttons(false);

        let connection_label = gtk::Label::new(Some("Offline"));
        connection_label.add_css_class("caption");
        connection_label.add_css_class("connection-indicator");
        connection_label.add_css_class("connection-offline");
        content_header.pack_start(&connection_label);

        let menu = gio::Menu::new();
        menu.append(Some("Sign In"), Some("app.sign-in"));
        menu.append(Some("Sign Out"), Some("app.sign-out"));
        menu.append(Some("Preferences"), Some("app.preferences"));
        menu.append(Some("Keyboard Shortcuts"), Some("app.show-shortcuts"));
        menu.append(Some("About Parley"), Some("app.about"));

        let menu_button = gtk::MenuButton::builder()
            .icon_name("open-menu-symbolic")
            .menu_model(&menu)
            .build();
        content_header.pack_end(&menu_button);

        let content_toolbar = adw::ToolbarView::new();
        content_toolbar.add_top_bar(&content_header);
        content_toolbar.set_content(Some(&content_stack));

        let content_page = adw::NavigationPage::builder()
            .title("Chat")
            .tag("content")
            .child(&content_toolbar)
            .build();

        let sidebar_page = adw::NavigationPage::builder()
            .title("Conversations")
            .tag("sidebar")
            .child(sidebar.widget())
            .build();

        let split_view = adw::NavigationSplitView::new();
        split_view.set_hexpand(true);
        split_view.set_vexpand(true);
        split_view.set_min_sidebar_width(220.0);
        split_view.set_max_sidebar_width(320.0);
        split_view.set_sidebar(Some(&sidebar_page));
        split_view.set_content(Some(&content_page));

        let breakpoint = adw::Breakpoint::new(
            adw::BreakpointCondition::parse("max-width: 600px")
                .expect("Invalid breakpoint condition"),
        );
        breakpoint.add_setter(&split_view, "collapsed", Some(&true.to_value()));
        breakpoint.add_setter(
            &content_header,
            "show-start-title-buttons",
            Some(&true.to_value()),
        );
        root.add_breakpoint(breakpoint);

        toast_overlay.set_child(Some(&split_view));

        let model = App {
            db: Database::new_in_memory().expect("placeholder db"),
            keyring: None,
            api: None,
            auth_api: None,
            realtime: None,
            store: ChatStore::new(),
            identity: None,
            user_identifier: String::new(),
            sidebar,
            chat_view,
            toast_overlay: toast_overlay.clone(),
            content_stack,
            connection_label,
            preferences_window: None,
            settings: AppSettings::default(),
        };

        let widgets = view_output!();

        // App actions and accelerators
        let app = relm4::main_adw_application();

        let sender_prefs = sender.input_sender().clone();
        let prefs_action = gio::SimpleAction::new("preferences", None);
        prefs_action.connect_activate(move |_, _| {
            sender_prefs.send(AppMsg::ShowPreferences).unwrap();
        });
        app.add_action(&prefs_action);
        app.set_accels_for_action("app.preferences", &["<Control>comma"]);

        let sender_about = sender.input_sender().clone();
        let about_action = gio::SimpleAction::new("about", None);
        about_action.connect_activate(move |_, _| {
            sender_about.send(AppMsg::ShowAbout).unwrap();
        });
        app.add_action(&about_action);

        let sender_new = sender.input_sender().clone();
        let new_chat_action = gio::SimpleAction::new("new-chat", None);
        new_chat_action.connect_activate(move |_, _| {
            sender_new.send(AppMsg::NewChat).unwrap();
        });
        app.add_action(&new_chat_action);
        app.set_accels_for_action("app.new-chat", &["<Control>n"]);

        let sender_shortcuts = sender.input_sender().clone();
        let shortcuts_action = gio::SimpleAction::new("show-shortcuts", None);
        shortcuts_action.connect_activate(move |_, _| {
            sender_shortcuts.send(AppMsg::ShowShortcuts).unwrap();
        });
        app.add_action(&shortcuts_action);
        app.set_accels_for_action("app.show-shortcuts", &["<Control>slash"]);

        let sender_signin = sender.input_sender().clone();
        let signin_action = gio::SimpleAction::new("sign-in", None);
        signin_action.connect_activate(move |_, _| {
            sender_signin.send(AppMsg::ShowSignIn).unwrap();
        });
        app.add_action(&signin_action);

        let sender_signout = sender.input_sender().clone();
        let signout_action = gio::SimpleAction::new("sign-out", None);
        signout_action.connect_activate(move |_, _| {
            sender_signout.send(AppMsg::SignOut).unwrap();
        });
        app.add_action(&signout_action);

        // Ctrl+F focuses the sidebar search
        let search_action = gio::SimpleAction::new("find", None);
        let sidebar_sender = model.sidebar.sender().clone();
        search_action.connect_activate(move |_, _| {
            sidebar_sender.send(SidebarMsg::FocusSearch).unwrap();
        });
        app.add_action(&search_action);
        app.set_accels_for_action("app.find", &["<Control>f"]);

        // Async initialization off the main loop
        sender.command(|out, _| {
            Box::pin(async move {
                match Self::async_init().await {
                    Ok((db, keyring)) => out.send(AppCmd::Initialized(db, keyring)).unwrap(),
                    Err(e) => out.send(AppCmd::InitFailed(e.to_string())).unwrap(),
                }
            })
        });

        AsyncComponentParts { model, widgets }
    }

    async fn update(
        &mut self,
        msg: Self::Input,
        sender: AsyncComponentSender<Self>,
        root: &Self::Root,
    ) {
        match msg {
            AppMsg::NewChat => {
                // Sessions are created lazily on the first message; a new
                // chat is just an empty composer.
                self.store.current_session_id = None;
                self.store.clear_messages();
                self.chat_view.emit(ChatViewMsg::Clear);
                self.chat_view.emit(ChatViewMsg::SetBotTyping(false));
                self.content_stack.set_visible_child_name("chat");
            }
            AppMsg::SessionSelected(id) => {
                let db = self.db.clone();
                let session_id = id.clone();
                sender.command(move |out, _| {
                    Box::pin(async move {
                        match db.list_messages(&session_id).await {
                            Ok(messages) => out
                                .send(AppCmd::MessagesLoaded(session_id, messages))
                                .unwrap(),
                            Err(e) => out
                                .send(AppCmd::ChatError(format!(
                                    "Failed to load messages: {}",
                                    e
                                )))
                                .unwrap(),
                        }
                    })
                });
            }
            AppMsg::DeleteSession(id) => {
                match self.db.delete_session(&id).await {
                    Ok(()) => {
                        let was_current = self.store.delete_session(&id);
                        self.sidebar
                            .emit(SidebarMsg::SetSessions(self.store.sessions().to_vec()));
                        if was_current {
                            self.chat_view.emit(ChatViewMsg::Clear);
                            self.content_stack.set_visible_child_name("empty");
                        }
                    }
                    Err(e) => self.show_toast(&format!("Failed to delete: {}", e)),
                }
            }
            AppMsg::RenameSession(id, new_title) => {
                if let Err(e) = self.db.rename_session(&id, &new_title).await {
                    tracing::error!("Failed to rename session: {}", e);
                    self.show_toast(&format!("Failed to rename: {}", e));
                    return;
                }
                self.store.rename_session(&id, new_title);
            }
            AppMsg::ExportSession(id) => {
                let Some(session) = self.store.find_session(&id) else {
                    return;
                };
                let dialog = gtk::FileDialog::builder()
                    .title("Export Conversation")
                    .initial_name(format!("{}.md", session.title))
                    .build();

                let sender_dlg = sender.input_sender().clone();
                let session_id = id.clone();
                dialog.save(
                    Some(root),
                    None::<&gio::Cancellable>,
                    move |result| {
                        if let Ok(file) = result {
                            if let Some(path) = file.path() {
                                sender_dlg
                                    .send(AppMsg::ExportSessionToFile(
                                        session_id.clone(),
                                        path,
                                    ))
                                    .unwrap();
                            }
                        }
                    },
                );
            }
            AppMsg::ExportSessionToFile(id, path) => {
                let db = self.db.clone();
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let result = export_session(&db, &id, &path).await;
                        out.send(AppCmd::ExportFinished(result)).unwrap();
                    })
                });
            }
            AppMsg::TogglePin(id, pinned) => {
                let db = self.db.clone();
                sender.command(move |out, _| {
                    Box::pin(async move {
                        if let Err(e) = db.set_session_pinned(&id, pinned).await {
                            tracing::error!("Failed to toggle pin: {}", e);
                        }
                        // Reload so the catalog reflects the new order
                        match db.list_sessions().await {
                            Ok(sessions) => {
                                out.send(AppCmd::SessionsLoaded(sessions)).unwrap()
                            }
                            Err(e) => tracing::error!("Failed to reload sessions: {}", e),
                        }
                    })
                });
            }
            AppMsg::ClearAllSessions => {
                match self.db.clear_all_sessions().await {
                    Ok(()) => {
                        self.store.clear_all_sessions();
                        self.store.current_session_id = None;
                        self.store.clear_messages();
                        self.chat_view.emit(ChatViewMsg::Clear);
                        self.content_stack.set_visible_child_name("empty");
                        self.show_toast("All conversations cleared");
                    }
                    Err(e) => self.show_toast(&format!("Failed to clear: {}", e)),
                }
            }
            AppMsg::SendMessage(text) => {
                self.handle_send_message(text, sender).await;
            }
            AppMsg::TypingChanged(active) => {
                // Typing is fire-and-forget; dropped silently while offline
                if let (Some(realtime), Some(session_id)) =
                    (&self.realtime, &self.store.current_session_id)
                {
                    realtime.send_typing(session_id, &self.user_identifier, active);
                }
            }
            AppMsg::InitComplete(db, keyring) => {
                self.db = db.clone();
                self.keyring = Some(keyring.clone());

                match ChatApi::new() {
                    Ok(api) => {
                        // One-shot reachability probe; the websocket owns the
                        // indicator from here on
                        let probe = api.clone();
                        sender.command(move |out, _| {
                            Box::pin(async move {
                                out.send(AppCmd::BackendHealth(probe.health().await))
                                    .unwrap();
                            })
                        });
                        self.api = Some(api);
                    }
                    Err(e) => self.show_toast(&format!("HTTP client error: {}", e)),
                }
                match AuthApi::new() {
                    Ok(api) => self.auth_api = Some(api),
                    Err(e) => self.show_toast(&format!("HTTP client error: {}", e)),
                }

                // Stable identifier for guests, minted once and persisted
                self.user_identifier = match db.get_setting(USER_IDENTIFIER_KEY).await {
                    Ok(Some(id)) if !id.is_empty() => id,
                    _ => {
                        let id = format!("guest-{}", Uuid::new_v4());
                        if let Err(e) = db.set_setting(USER_IDENTIFIER_KEY, &id).await {
                            tracing::error!("Failed to persist user identifier: {}", e);
                        }
                        id
                    }
                };

                let db_settings = db.clone();
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let settings = SettingsService::load(&db_settings).await;
                        out.send(AppCmd::SettingsLoaded(settings)).unwrap();
                    })
                });

                let db_sessions = db.clone();
                let db_auth = db;
                let keyring_auth = keyring;
                sender.command(move |out, _| {
                    Box::pin(async move {
                        match db_sessions.list_sessions().await {
                            Ok(sessions) => out.send(AppCmd::SessionsLoaded(sessions)).unwrap(),
                            Err(e) => tracing::error!("Failed to load sessions: {}", e),
                        }
                        if let Some((identity, _token)) =
                            AuthService::load(&db_auth, &keyring_auth).await
                        {
                            out.send(AppCmd::IdentityRestored(identity)).unwrap();
                        }
                    })
                });

                // Realtime supervisor; events stream back as commands until
                // the component shuts down.
                sender.command(|out, shutdown| {
                    shutdown
                        .register(async move {
                            let (tx, mut rx) = mpsc::unbounded_channel();
                            let handle = RealtimeClient::spawn(
                                Arc::new(WsConnector),
                                config::ws_url(),
                                tx,
                            );
                            out.send(AppCmd::RealtimeStarted(handle.clone())).unwrap();

                            while let Some(event) = rx.recv().await {
                                if out.send(AppCmd::Realtime(event)).is_err() {
                                    break;
                                }
                            }
                            handle.disconnect();
                        })
                        .drop_on_shutdown()
                });
            }
            AppMsg::InitFailed(err) => {
                tracing::error!("Initialization failed: {}", err);
                self.show_toast(&format!("Error: {}", err));
            }
            AppMsg::ShowToast(msg) => {
                self.show_toast(&msg);
            }
            AppMsg::ShowPreferences => {
                self.preferences_window = Some(crate::ui::window::create_preferences_window(
                    root,
                    sender.input_sender(),
                    &self.settings,
                ));
            }
            AppMsg::ShowAbout => {
                crate::ui::window::create_about_dialog(root);
            }
            AppMsg::ShowShortcuts => {
                crate::ui::window::create_shortcuts_window(root);
            }
            AppMsg::ShowSignIn => {
                crate::ui::window::create_sign_in_dialog(root, sender.input_sender());
            }
            AppMsg::SignIn { email, password } => {
                if let Err(e) = validate_email(&email) {
                    self.show_toast(&e.to_string());
                    return;
                }
                if password.is_empty() {
                    self.show_toast("Password is required");
                    return;
                }
                let Some(auth_api) = self.auth_api.clone() else {
                    return;
                };
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let result = auth_api
                            .login(&LoginRequest { email, password })
                            .await
                            .map(|resp| {
                                let token = resp.token.clone();
                                (UserIdentity::from(resp), token)
                            });
                        out.send(AppCmd::AuthResult(result)).unwrap();
                    })
                });
            }
            AppMsg::Register {
                email,
                password,
                full_name,
            } => {
                if let Err(e) = validate_email(&email) {
                    self.show_toast(&e.to_string());
                    return;
                }
                if let Err(e) = validate_password(&password) {
                    self.show_toast(&e.to_string());
                    return;
                }
                if full_name.trim().is_empty() {
                    self.show_toast("Full name is required");
                    return;
                }
                let Some(auth_api) = self.auth_api.clone() else {
                    return;
                };
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let result = auth_api
                            .register(&RegisterRequest {
                                full_name,
                                email,
                                password,
                                phone: None,
                            })
                            .await
                            .map(|resp| {
                                let token = resp.token.clone();
                                (UserIdentity::from(resp), token)
                            });
                        out.send(AppCmd::AuthResult(result)).unwrap();
                    })
                });
            }
            AppMsg::SignOut => {
                if let Some(keyring) = &self.keyring {
                    if let Err(e) = AuthService::clear(&self.db, keyring).await {
                        tracing::error!("Failed to clear credentials: {}", e);
                    }
                }
                self.identity = None;
                self.show_toast("Signed out");
            }
            AppMsg::SettingsChanged(settings) => {
                self.settings = settings.clone();
                apply_color_scheme(settings.color_scheme);
                apply_message_font_size(settings.message_font_size);
                self.chat_view
                    .emit(ChatViewMsg::ApplySettings(settings.clone()));

                let db = self.db.clone();
                sender.command(move |_out, _| {
                    Box::pin(async move {
                        if let Err(e) = SettingsService::save(&db, &settings).await {
                            tracing::error!("Failed to save settings: {}", e);
                        }
                    })
                });
            }
        }
    }

    async fn update_cmd(
        &mut self,
        msg: Self::CommandOutput,
        sender: AsyncComponentSender<Self>,
        _root: &Self::Root,
    ) {
        match msg {
            AppCmd::Initialized(db, keyring) => {
                sender.input(AppMsg::InitComplete(db, keyring));
            }
            AppCmd::InitFailed(err) => {
                sender.input(AppMsg::InitFailed(err));
            }
            AppCmd::SessionsLoaded(sessions) => {
                self.store.set_sessions(sessions);
                self.sidebar
                    .emit(SidebarMsg::SetSessions(self.store.sessions().to_vec()));
            }
            AppCmd::MessagesLoaded(session_id, messages) => {
                self.store.current_session_id = Some(session_id.clone());
                self.store.load_messages(messages);

                let visible: Vec<Message> = self
                    .store
                    .unique_messages()
                    .into_iter()
                    .cloned()
                    .collect();
                self.chat_view.emit(ChatViewMsg::LoadMessages(visible));
                self.chat_view.emit(ChatViewMsg::SetBotTyping(false));
                self.content_stack.set_visible_child_name("chat");

                let db = self.db.clone();
                sender.command(move |_out, _| {
                    Box::pin(async move {
                        if let Err(e) = db.mark_session_read(&session_id).await {
                            tracing::error!("Failed to mark session read: {}", e);
                        }
                    })
                });
            }
            AppCmd::RealtimeStarted(handle) => {
                self.realtime = Some(handle);
            }
            AppCmd::Realtime(event) => {
                self.handle_realtime_event(event, sender).await;
            }
            AppCmd::BotReply(message) => {
                self.handle_bot_reply(message).await;
            }
            AppCmd::SendFailed(session_id, err) => {
                tracing::warn!(session_id = %session_id, "send failed: {}", err);
                self.store.loading = false;
                self.chat_view.emit(ChatViewMsg::SetLoading(false));

                // HTTP failures become an inline notice, not a toast
                if self.store.current_session_id.as_deref() == Some(&session_id) {
                    let mut notice = Message::user(&session_id, format!("Message failed: {}", err));
                    notice.sender = Sender::System;
                    self.store.push_message(notice.clone());
                    self.chat_view.emit(ChatViewMsg::AddMessage(notice));
                }
            }
            AppCmd::AuthResult(result) => match result {
                Ok((identity, token)) => {
                    if let Some(keyring) = &self.keyring {
                        if let Err(e) =
                            AuthService::save(&self.db, keyring, &identity, &token).await
                        {
                            tracing::error!("Failed to persist credentials: {}", e);
                        }
                    }
                    self.user_identifier = identity.user_identifier().to_string();
                    self.show_toast(&format!("Signed in as {}", identity.full_name));
                    self.identity = Some(identity);
                }
                Err(e) => {
                    self.show_toast(&format!("Sign-in failed: {}", e));
                }
            },
            AppCmd::IdentityRestored(identity) => {
                self.user_identifier = identity.user_identifier().to_string();
                tracing::info!(email = %identity.email, "restored signed-in identity");
                self.identity = Some(identity);
            }
            AppCmd::SettingsLoaded(settings) => {
                self.settings = settings;
                apply_color_scheme(self.settings.color_scheme);
                apply_message_font_size(self.settings.message_font_size);
                self.chat_view
                    .emit(ChatViewMsg::ApplySettings(self.settings.clone()));
            }
            AppCmd::BackendHealth(healthy) => {
                if healthy {
                    tracing::debug!("backend health check passed");
                } else {
                    tracing::warn!("backend health check failed");
                    self.show_toast("Backend is unreachable. Messages will be queued until the connection returns.");
                }
            }
            AppCmd::ExportFinished(result) => match result {
                Ok(path) => self.show_toast(&format!("Exported to {}", path.display())),
                Err(e) => self.show_toast(&format!("Export failed: {}", e)),
            },
            AppCmd::ChatError(err) => {
                self.show_toast(&err);
                self.store.loading = false;
                self.chat_view.emit(ChatViewMsg::SetLoading(false));
            }
        }
    }
}

impl App {
    async fn async_init() -> anyhow::Result<(Database, KeyringService)> {
        let db = Database::new().await?;
        let keyring = KeyringService::new().await?;
        Ok((db, keyring))
    }

    fn show_toast(&self, message: &str) {
        let toast = adw::Toast::new(message);
        toast.set_timeout(3);
        self.toast_overlay.add_toast(toast);
    }

    async fn handle_send_message(&mut self, text: String, sender: AsyncComponentSender<Self>) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        // First message creates the session, titled from the text
        let session_id = match &self.store.current_session_id {
            Some(id) => id.clone(),
            None => {
                let now = Utc::now();
                let session = ChatSession {
                    id: Uuid::new_v4().to_string(),
                    title: truncate_title(&text),
                    preview: String::new(),
                    created_at: now,
                    updated_at: now,
                    message_count: 0,
                    pinned: false,
                    tags: Vec::new(),
                };
                if let Err(e) = self.db.insert_session(&session).await {
                    self.show_toast(&format!("Failed to create conversation: {}", e));
                    return;
                }
                let id = session.id.clone();
                self.store.current_session_id = Some(id.clone());
                self.store.upsert_session(session);
                id
            }
        };

        // Optimistic append; the server echo shares this id and de-dupes
        let user_message = Message::user(&session_id, &text);
        self.store.push_message(user_message.clone());
        self.chat_view.emit(ChatViewMsg::AddMessage(user_message.clone()));

        if let Err(e) = self.db.insert_message(&user_message).await {
            tracing::error!("Failed to persist message: {}", e);
        }
        if let Err(e) = self.db.touch_session(&session_id).await {
            tracing::error!("Failed to touch session: {}", e);
        }
        self.store.touch_session(&session_id, text.clone());
        self.sidebar
            .emit(SidebarMsg::SetSessions(self.store.sessions().to_vec()));

        self.store.loading = true;
        self.chat_view.emit(ChatViewMsg::SetLoading(true));
        self.content_stack.set_visible_child_name("chat");

        let Some(api) = self.api.clone() else {
            self.show_toast("Not initialized yet");
            return;
        };
        let Some(realtime) = self.realtime.clone() else {
            self.show_toast("Not initialized yet");
            return;
        };
        let user_identifier = self.user_identifier.clone();
        sender.command(move |out, _| {
            Box::pin(async move {
                match chat::dispatch_message(&api, &realtime, &session_id, &text, &user_identifier)
                    .await
                {
                    // Reply arrives later on the realtime topic
                    Ok(SendOutcome::Realtime) => {}
                    Ok(SendOutcome::Direct(reply)) => {
                        out.send(AppCmd::BotReply(*reply)).unwrap();
                    }
                    Err(e) => {
                        out.send(AppCmd::SendFailed(session_id, e)).unwrap();
                    }
                }
            })
        });
    }

    async fn handle_realtime_event(
        &mut self,
        event: RealtimeEvent,
        _sender: AsyncComponentSender<Self>,
    ) {
        match event {
            RealtimeEvent::Message(response) => {
                self.handle_bot_reply(chat::bot_message(&response)).await;
            }
            RealtimeEvent::Typing(typing) => {
                if !self.settings.typing_indicator {
                    return;
                }
                // Our own typing comes back on the broadcast topic too
                if typing.user_identifier == self.user_identifier {
                    return;
                }
                if self.store.current_session_id.as_deref() == Some(&typing.session_id) {
                    self.store.bot_typing = typing.is_typing;
                    self.chat_view
                        .emit(ChatViewMsg::SetBotTyping(typing.is_typing));
                }
            }
            RealtimeEvent::ConnectionChanged(connected) => {
                self.store.connection = if connected {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                };
                if connected {
                    self.connection_label.set_label("Online");
                    self.connection_label.remove_css_class("connection-offline");
                    self.connection_label.add_css_class("connection-online");
                } else {
                    self.connection_label.set_label("Offline");
                    self.connection_label.remove_css_class("connection-online");
                    self.connection_label.add_css_class("connection-offline");
                }
            }
        }
    }

    async fn handle_bot_reply(&mut self, message: Message) {
        let session_id = message.session_id.clone();

        // Duplicate on the wire is harmless here: messages insert OR IGNORE
        if let Err(e) = self.db.insert_message(&message).await {
            tracing::error!("Failed to persist reply: {}", e);
        }

        if self.store.current_session_id.as_deref() != Some(&session_id) {
            // Reply for a background session; only the catalog moves
            if !self.store.note_background_reply(&message) {
                if let Err(e) = self.db.touch_session(&session_id).await {
                    tracing::error!("Failed to touch session: {}", e);
                }
                self.sidebar
                    .emit(SidebarMsg::SetSessions(self.store.sessions().to_vec()));
            }
            return;
        }

        self.store.loading = false;
        self.store.bot_typing = false;
        self.chat_view.emit(ChatViewMsg::SetLoading(false));
        self.chat_view.emit(ChatViewMsg::SetBotTyping(false));

        // An HTTP reply may be echoed again on the topic; the store collapses
        // by id and only rolls the catalog forward for a first occurrence
        let (duplicate, celebration) = self.store.push_reply(message.clone());
        if !duplicate {
            if let Err(e) = self.db.touch_session(&session_id).await {
                tracing::error!("Failed to touch session: {}", e);
            }
            self.chat_view.emit(ChatViewMsg::AddMessage(message));
            if self.settings.sound_notifications {
                self.toast_overlay.display().beep();
            }
            self.sidebar
                .emit(SidebarMsg::SetSessions(self.store.sessions().to_vec()));
        }

        if self.settings.celebrations {
            if let Some(celebration) = celebration {
                self.show_toast(&celebration_text(celebration, self.store.unique_count()));
            }
        }
    }
}

fn celebration_text(celebration: Celebration, count: usize) -> String {
    match celebration {
        Celebration::Welcome => "Welcome! That was your first message.".to_string(),
        Celebration::Achievement => format!("Achievement unlocked: {} messages!", count),
        Celebration::Milestone => format!("Milestone reached: {} messages!", count),
    }
}

async fn export_session(
    db: &Database,
    session_id: &str,
    path: &std::path::Path,
) -> Result<PathBuf, String> {
    let session = db
        .get_session(session_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Conversation not found".to_string())?;
    let messages = db
        .list_messages(session_id)
        .await
        .map_err(|e| e.to_string())?;

    let body = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        export::export_to_json(&session, &messages).map_err(|e| e.to_string())?
    } else {
        export::export_to_markdown(&session, &messages)
    };

    tokio::fs::write(path, body)
        .await
        .map_err(|e| e.to_string())?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::STARTER_PROMPTS;
    use crate::config;

    #[test]
    fn starter_prompts_send_as_is() {
        let mut seen = std::collections::HashSet::new();
        for (title, text) in STARTER_PROMPTS {
            assert!(!title.is_empty());
            // Each prompt goes straight through the send pipeline
            assert!(!text.trim().is_empty());
            assert!(text.chars().count() <= config::MAX_MESSAGE_CHARS as usize);
            assert!(seen.insert(text), "duplicate prompt: {text}");
        }
    }
}
