// ABOUTME: Menu texts and typed commands for each interactive session state
// Menu input is dispatched on its first non-whitespace character, confirmations on the whole line

pub const WELCOME_MENU: &str = "Welcome to Workspace Hub!\n\
1. Introduction\n\
2. Register\n\
3. Login\n\
4. Exit\n";

pub const MAIN_MENU: &str = "Main Menu:\n\
1. List Projects\n\
2. Create New Project\n\
3. Open Project\n\
4. Delete Project\n\
5. Upload Project\n\
6. Download Project\n\
7. Execute Remote Command\n\
8. Logout\n";

pub const PROJECT_MENU: &str = "Project Menu:\n\
a. List Files\n\
b. Create New File\n\
c. Open/Edit File\n\
d. Upload File\n\
e. Download File\n\
f. Delete File\n\
g. Return to Main Menu\n";

pub const INTRODUCTION: &str = "Workspace Hub keeps your projects on the server.\n\
Register once, log in, then create projects, edit and upload files,\n\
upload or download whole directory trees and run shell commands inside your workspace.\n";

/// Marker that ends content typed during file editing
pub const EDIT_END_MARKER: &str = "EOF";

pub const CHOICE_PROMPT: &str = "Enter your choice: ";
pub const UPLOAD_PROJECT_PROMPT: &str = "Enter project name to upload: ";
pub const DOWNLOAD_PROJECT_PROMPT: &str = "Enter project name to download: ";
pub const UPLOAD_FILE_PROMPT: &str = "Enter file name to upload: ";
pub const DOWNLOAD_FILE_PROMPT: &str = "Enter file name to download: ";
pub const SHELL_PROMPT: &str = "Enter command to execute (or 'exit' to quit): ";

// Each marker line is followed by binary transfer data on the same stream
pub const RECEIVING_PROJECT: &str = "Receiving project ";
pub const SENDING_PROJECT: &str = "Sending project ";
pub const RECEIVING_FILE: &str = "Receiving file ";
pub const SENDING_FILE: &str = "Sending file ";

/// A menu whose options are selected by a single key
pub trait MenuCommand: Sized {
    const MENU: &'static str;

    fn from_key(key: char) -> Option<Self>;

    fn parse(line: &str) -> Option<Self> {
        line.trim().chars().next().and_then(Self::from_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomeCommand {
    Introduction,
    Register,
    Login,
    Exit,
}

impl MenuCommand for WelcomeCommand {
    const MENU: &'static str = WELCOME_MENU;

    fn from_key(key: char) -> Option<Self> {
        match key {
            '1' => Some(Self::Introduction),
            '2' => Some(Self::Register),
            '3' => Some(Self::Login),
            '4' => Some(Self::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainCommand {
    ListProjects,
    CreateProject,
    OpenProject,
    DeleteProject,
    UploadProject,
    DownloadProject,
    RemoteCommand,
    Logout,
}

impl MenuCommand for MainCommand {
    const MENU: &'static str = MAIN_MENU;

    fn from_key(key: char) -> Option<Self> {
        match key {
            '1' => Some(Self::ListProjects),
            '2' => Some(Self::CreateProject),
            '3' => Some(Self::OpenProject),
            '4' => Some(Self::DeleteProject),
            '5' => Some(Self::UploadProject),
            '6' => Some(Self::DownloadProject),
            '7' => Some(Self::RemoteCommand),
            '8' => Some(Self::Logout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectCommand {
    ListFiles,
    CreateFile,
    EditFile,
    UploadFile,
    DownloadFile,
    DeleteFile,
    Return,
}

impl MenuCommand for ProjectCommand {
    const MENU: &'static str = PROJECT_MENU;

    fn from_key(key: char) -> Option<Self> {
        match key {
            'a' => Some(Self::ListFiles),
            'b' => Some(Self::CreateFile),
            'c' => Some(Self::EditFile),
            'd' => Some(Self::UploadFile),
            'e' => Some(Self::DownloadFile),
            'f' => Some(Self::DeleteFile),
            'g' => Some(Self::Return),
            _ => None,
        }
    }
}

/// Answer to a yes/no question; anything but an exact `yes` declines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
}

impl Confirmation {
    pub fn parse(line: &str) -> Self {
        if line.trim() == "yes" {
            Self::Yes
        } else {
            Self::No
        }
    }
}
