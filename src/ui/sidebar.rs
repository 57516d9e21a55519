use adw::prelude::*;
use chrono::Utc;
use relm4::factory::FactoryVecDeque;
use relm4::prelude::*;

use crate::models::ChatSession;
use crate::services::sessions::{self, SortKey, TimeFilter};

// --- SidebarItem: discriminated union for group headers vs session rows ---

#[derive(Debug, Clone)]
pub enum SidebarItem {
    Header(String), // "Pinned (2)", "Today (5)", ...
    Session(ChatSession),
}

// --- SessionRow factory component ---

#[derive(Debug)]
pub struct SessionRow {
    pub item: SidebarItem,
}

#[derive(Debug)]
pub enum SessionRowMsg {}

#[derive(Debug)]
pub enum SessionRowOutput {}

#[relm4::factory(pub)]
impl FactoryComponent for SessionRow {
    type Init = SidebarItem;
    type Input = SessionRowMsg;
    type Output = SessionRowOutput;
    type CommandOutput = ();
    type ParentWidget = gtk::ListBox;

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_spacing: 2,
            set_margin_all: 6,
        }
    }

    fn init_model(item: Self::Init, _index: &DynamicIndex, _sender: FactorySender<Self>) -> Self {
        Self { item }
    }

    fn init_widgets(
        &mut self,
        _index: &DynamicIndex,
        root: Self::Root,
        returned_widget: &<Self::ParentWidget as relm4::factory::FactoryView>::ReturnedWidget,
        _sender: FactorySender<Self>,
    ) -> Self::Widgets {
        match &self.item {
            SidebarItem::Header(label) => {
                let header_label = gtk::Label::builder()
                    .label(label)
                    .halign(gtk::Align::Start)
                    .margin_top(8)
                    .margin_bottom(2)
                    .margin_start(4)
                    .build();
                header_label.add_css_class("dim-label");
                header_label.add_css_class("caption");
                header_label.add_css_class("sidebar-group-header");
                root.append(&header_label);

                // Header rows are labels only, never activatable
                returned_widget.set_activatable(false);
                returned_widget.set_selectable(false);
            }
            SidebarItem::Session(session) => {
                let title_box = gtk::Box::builder()
                    .orientation(gtk::Orientation::Horizontal)
                    .spacing(4)
                    .build();

                if session.pinned {
                    let pin_icon = gtk::Image::from_icon_name("view-pin-symbolic");
                    pin_icon.add_css_class("dim-label");
                    pin_icon.set_pixel_size(12);
                    title_box.append(&pin_icon);
                }

                let title_label = gtk::Label::builder()
                    .label(&session.title)
                    .halign(gtk::Align::Start)
                    .ellipsize(gtk::pango::EllipsizeMode::End)
                    .max_width_chars(30)
                    .build();
                title_label.add_css_class("heading");
                title_box.append(&title_label);

                root.append(&title_box);

                if !session.preview.is_empty() {
                    let preview_label = gtk::Label::builder()
                        .label(&session.preview)
                        .halign(gtk::Align::Start)
                        .ellipsize(gtk::pango::EllipsizeMode::End)
                        .max_width_chars(35)
                        .build();
                    preview_label.add_css_class("dim-label");
                    preview_label.add_css_class("caption");
                    preview_label.set_opacity(0.7);
                    root.append(&preview_label);
                }

                let meta_label = gtk::Label::builder()
                    .label(format!(
                        "{} · {} messages",
                        sessions::relative_time(session.updated_at, Utc::now()),
                        session.message_count
                    ))
                    .halign(gtk::Align::Start)
                    .build();
                meta_label.add_css_class("dim-label");
                meta_label.add_css_class("caption");
                root.append(&meta_label);

                if session.pinned {
                    returned_widget.add_css_class("pinned-session");
                }
            }
        }

        let widgets = view_output!();
        widgets
    }
}

// --- Sidebar component ---

pub struct Sidebar {
    rows: FactoryVecDeque<SessionRow>,
    catalog: Vec<ChatSession>,
    search_entry: gtk::SearchEntry,
    search_term: String,
    sort_key: SortKey,
    time_filter: TimeFilter,
}

#[derive(Debug)]
pub enum SidebarMsg {
    /// Replace the whole catalog; the grouped view is re-derived.
    SetSessions(Vec<ChatSession>),
    NewChat,
    RowActivated(usize),
    FocusSearch,
    SearchChanged(String),
    SortSelected(u32),
    FilterSelected(u32),
    // Context menu
    ShowContextMenu(f64, f64, usize), // x, y, row index
    TogglePin(usize),
    RenameSession(usize),
    ExportSession(usize),
    DeleteSession(usize),
    // Dialog responses
    DoRename(String, String), // id, new title
    RequestClearAll,
    DoClearAll,
}

#[derive(Debug)]
pub enum SidebarOutput {
    NewChat,
    SessionSelected(String),
    TogglePin(String, bool), // id, new pinned state
    RenameSession(String, String),
    ExportSession(String),
    DeleteSession(String),
    ClearAll,
}

#[relm4::component(pub)]
impl Component for Sidebar {
    type Init = ();
    type Input = SidebarMsg;
    type Output = SidebarOutput;
    type CommandOutput = ();

    view! {
        adw::ToolbarView {
            add_top_bar = &adw::HeaderBar {
                set_show_end_title_buttons: false,

                pack_start = &gtk::Button {
                    set_icon_name: "list-add-symbolic",
                    set_tooltip_text: Some("New Chat"),
                    connect_clicked => SidebarMsg::NewChat,
                },

                #[wrap(Some)]
                set_title_widget = &adw::WindowTitle {
                    set_title: "Conversations",
                },

                pack_end = &gtk::Button {
                    set_icon_name: "user-trash-symbolic",
                    set_tooltip_text: Some("Clear all conversations"),
                    add_css_class: "flat",
                    connect_clicked => SidebarMsg::RequestClearAll,
                },
            },

            #[wrap(Some)]
            set_content = &gtk::Box {
                set_orientation: gtk::Orientation::Vertical,
                set_spacing: 0,

                #[local_ref]
                search_entry -> gtk::SearchEntry {
                    set_placeholder_text: Some("Search conversations..."),
                    set_margin_start: 8,
                    set_margin_end: 8,
                    set_margin_top: 4,
                    set_margin_bottom: 4,
                    connect_search_changed[sender] => move |entry| {
                        sender.input(SidebarMsg::SearchChanged(entry.text().to_string()));
                    },
                },

                gtk::Box {
                    set_orientation: gtk::Orientation::Horizontal,
                    set_spacing: 4,
                    set_margin_start: 8,
                    set_margin_end: 8,
                    set_margin_bottom: 4,

                    #[name = "sort_dropdown"]
                    gtk::DropDown {
                        set_hexpand: true,
                        set_tooltip_text: Some("Sort order"),
                        connect_selected_notify[sender] => move |dd| {
                            sender.input(SidebarMsg::SortSelected(dd.selected()));
                        },
                    },

                    #[name = "filter_dropdown"]
                    gtk::DropDown {
                        set_hexpand: true,
                        set_tooltip_text: Some("Filter"),
                        connect_selected_notify[sender] => move |dd| {
                            sender.input(SidebarMsg::FilterSelected(dd.selected()));
                        },
                    },
                },

                gtk::ScrolledWindow {
                    set_hscrollbar_policy: gtk::PolicyType::Never,
                    set_vexpand: true,

                    #[local_ref]
                    session_list -> gtk::ListBox {
                        set_selection_mode: gtk::SelectionMode::Single,
                        add_css_class: "navigation-sidebar",
                    },
                },
            },
        }
    }

    fn init(
        _init: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let rows = FactoryVecDeque::builder()
            .launch(gtk::ListBox::default())
            .detach();

        let search_entry = gtk::SearchEntry::new();

        let model = Self {
            rows,
            catalog: Vec::new(),
            search_entry: search_entry.clone(),
            search_term: String::new(),
            sort_key: SortKey::default(),
            time_filter: TimeFilter::default(),
        };

        let session_list = model.rows.widget();
        let widgets = view_output!();

        let sort_labels: Vec<&str> = SortKey::ALL.iter().map(|k| k.label()).collect();
        widgets
            .sort_dropdown
            .set_model(Some(&gtk::StringList::new(&sort_labels)));

        let filter_labels: Vec<&str> = TimeFilter::ALL.iter().map(|f| f.label()).collect();
        widgets
            .filter_dropdown
            .set_model(Some(&gtk::StringList::new(&filter_labels)));

        let list = model.rows.widget().clone();
        let sender_row = sender.clone();
        list.connect_row_activated(move |_, row| {
            sender_row.input(SidebarMsg::RowActivated(row.index() as usize));
        });

        // Right-click context menu
        let gesture = gtk::GestureClick::new();
        gesture.set_button(3);
        let list_rc = model.rows.widget().clone();
        let sender_rc = sender.clone();
        gesture.connect_released(move |_, _, x, y| {
            if let Some(row) = list_rc.row_at_y(y as i32) {
                sender_rc.input(SidebarMsg::ShowContextMenu(x, y, row.index() as usize));
            }
        });
        model.rows.widget().add_controller(gesture);

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, root: &Self::Root) {
        match msg {
            SidebarMsg::SetSessions(sessions) => {
                self.catalog = sessions;
                self.rebuild();
            }
            SidebarMsg::NewChat => {
                let _ = sender.output(SidebarOutput::NewChat);
            }
            SidebarMsg::RowActivated(index) => {
                if let Some(id) = self.session_id_at(index) {
                    let _ = sender.output(SidebarOutput::SessionSelected(id));
                }
            }
            SidebarMsg::FocusSearch => {
                self.search_entry.grab_focus();
            }
            SidebarMsg::SearchChanged(term) => {
                self.search_term = term;
                self.rebuild();
            }
            SidebarMsg::SortSelected(index) => {
                if let Some(key) = SortKey::ALL.get(index as usize) {
                    self.sort_key = *key;
                    self.rebuild();
                }
            }
            SidebarMsg::FilterSelected(index) => {
                if let Some(filter) = TimeFilter::ALL.get(index as usize) {
                    self.time_filter = *filter;
                    self.rebuild();
                }
            }
            SidebarMsg::ShowContextMenu(x, y, index) => {
                let is_pinned = match self.rows.get(index).map(|r| &r.item) {
                    Some(SidebarItem::Session(s)) => s.pinned,
                    _ => return, // header row, nothing to do
                };

                let list_widget = self.rows.widget();

                let menu = gio::Menu::new();
                if is_pinned {
                    menu.append(Some("Unpin"), Some("sidebar.toggle-pin"));
                } else {
                    menu.append(Some("Pin"), Some("sidebar.toggle-pin"));
                }
                menu.append(Some("Rename"), Some("sidebar.rename"));
                menu.append(Some("Export"), Some("sidebar.export"));
                menu.append(Some("Delete"), Some("sidebar.delete"));

                let action_group = gio::SimpleActionGroup::new();

                let sender_pin = sender.input_sender().clone();
                let pin_action = gio::SimpleAction::new("toggle-pin", None);
                let idx = index;
                pin_action.connect_activate(move |_, _| {
                    sender_pin.send(SidebarMsg::TogglePin(idx)).unwrap();
                });
                action_group.add_action(&pin_action);

                let sender_rename = sender.input_sender().clone();
                let rename_action = gio::SimpleAction::new("rename", None);
                let idx = index;
                rename_action.connect_activate(move |_, _| {
                    sender_rename.send(SidebarMsg::RenameSession(idx)).unwrap();
                });
                action_group.add_action(&rename_action);

                let sender_export = sender.input_sender().clone();
                let export_action = gio::SimpleAction::new("export", None);
                let idx = index;
                export_action.connect_activate(move |_, _| {
                    sender_export.send(SidebarMsg::ExportSession(idx)).unwrap();
                });
                action_group.add_action(&export_action);

                let sender_delete = sender.input_sender().clone();
                let delete_action = gio::SimpleAction::new("delete", None);
                let idx = index;
                delete_action.connect_activate(move |_, _| {
                    sender_delete.send(SidebarMsg::DeleteSession(idx)).unwrap();
                });
                action_group.add_action(&delete_action);

                list_widget.insert_action_group("sidebar", Some(&action_group));

                let popover = gtk::PopoverMenu::from_model(Some(&menu));
                popover.set_parent(list_widget);
                popover.set_pointing_to(Some(&gtk::gdk::Rectangle::new(
                    x as i32, y as i32, 1, 1,
                )));
                popover.set_has_arrow(true);

                // Clean up after close; delayed so the action fires first
                let parent = list_widget.clone();
                popover.connect_closed(move |p| {
                    let popover = p.clone();
                    let parent = parent.clone();
                    glib::idle_add_local_once(move || {
                        popover.unparent();
                        parent.insert_action_group("sidebar", None::<&gio::SimpleActionGroup>);
                    });
                });

                popover.popup();
            }
            SidebarMsg::TogglePin(index) => {
                let pin_data = self.rows.get(index).and_then(|r| match &r.item {
                    SidebarItem::Session(s) => Some((s.id.clone(), !s.pinned)),
                    SidebarItem::Header(_) => None,
                });
                if let Some((id, pinned)) = pin_data {
                    let _ = sender.output(SidebarOutput::TogglePin(id, pinned));
                }
            }
            SidebarMsg::RenameSession(index) => {
                let session_data = self.rows.get(index).and_then(|r| match &r.item {
                    SidebarItem::Session(s) => Some((s.id.clone(), s.title.clone())),
                    SidebarItem::Header(_) => None,
                });

                if let Some((id, current_title)) = session_data {
                    let dialog = adw::AlertDialog::builder()
                        .heading("Rename Conversation")
                        .body("Enter a new name:")
                        .build();

                    let entry = gtk::Entry::builder()
                        .text(&current_title)
                        .activates_default(true)
                        .build();

                    dialog.set_extra_child(Some(&entry));
                    dialog.add_response("cancel", "Cancel");
                    dialog.add_response("rename", "Rename");
                    dialog.set_response_appearance("rename", adw::ResponseAppearance::Suggested);
                    dialog.set_default_response(Some("rename"));
                    dialog.set_close_response("cancel");

                    let sender_dlg = sender.input_sender().clone();
                    dialog.connect_response(None, move |_dialog, response| {
                        if response == "rename" {
                            let new_title = entry.text().to_string();
                            if !new_title.trim().is_empty() {
                                sender_dlg
                                    .send(SidebarMsg::DoRename(id.clone(), new_title))
                                    .unwrap();
                            }
                        }
                    });

                    if let Some(window) =
                        root.root().and_then(|r| r.downcast::<gtk::Window>().ok())
                    {
                        dialog.present(Some(&window));
                    }
                }
            }
            SidebarMsg::DoRename(id, new_title) => {
                if let Some(session) = self.catalog.iter_mut().find(|s| s.id == id) {
                    session.title = new_title.clone();
                }
                self.rebuild();
                let _ = sender.output(SidebarOutput::RenameSession(id, new_title));
            }
            SidebarMsg::ExportSession(index) => {
                if let Some(id) = self.session_id_at(index) {
                    let _ = sender.output(SidebarOutput::ExportSession(id));
                }
            }
            SidebarMsg::DeleteSession(index) => {
                if let Some(id) = self.session_id_at(index) {
                    let _ = sender.output(SidebarOutput::DeleteSession(id));
                }
            }
            SidebarMsg::RequestClearAll => {
                if self.catalog.is_empty() {
                    return;
                }
                let dialog = adw::AlertDialog::builder()
                    .heading("Clear All Conversations")
                    .body("This deletes every conversation and its messages. This cannot be undone.")
                    .build();
                dialog.add_response("cancel", "Cancel");
                dialog.add_response("clear", "Clear All");
                dialog.set_response_appearance("clear", adw::ResponseAppearance::Destructive);
                dialog.set_close_response("cancel");

                let sender_dlg = sender.input_sender().clone();
                dialog.connect_response(None, move |_dialog, response| {
                    if response == "clear" {
                        sender_dlg.send(SidebarMsg::DoClearAll).unwrap();
                    }
                });

                if let Some(window) = root.root().and_then(|r| r.downcast::<gtk::Window>().ok()) {
                    dialog.present(Some(&window));
                }
            }
            SidebarMsg::DoClearAll => {
                self.catalog.clear();
                self.rebuild();
                let _ = sender.output(SidebarOutput::ClearAll);
            }
        }
    }
}

impl Sidebar {
    /// Re-derives the grouped row list from the catalog and the current
    /// search/sort/filter state.
    fn rebuild(&mut self) {
        let now = Utc::now();
        let visible = sessions::filter_and_sort(
            &self.catalog,
            &self.search_term,
            self.sort_key,
            self.time_filter,
            now,
        );
        let grouped = sessions::group_sessions(&visible, now);

        let mut guard = self.rows.guard();
        guard.clear();
        for (group, members) in grouped {
            guard.push_back(SidebarItem::Header(format!(
                "{} ({})",
                group.label(),
                members.len()
            )));
            for session in members {
                guard.push_back(SidebarItem::Session(session.clone()));
            }
        }
    }

    fn session_id_at(&self, index: usize) -> Option<String> {
        self.rows.get(index).and_then(|r| match &r.item {
            SidebarItem::Session(s) => Some(s.id.clone()),
            SidebarItem::Header(_) => None,
        })
    }
}
