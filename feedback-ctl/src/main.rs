use feedback_client::{
    api::{Comment, CommentId, NewComment},
    Client, CommentBoard,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "http://localhost:3001")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List all comments, newest first
    List,

    /// Show a single comment
    Get { id: i64 },

    /// Post a comment
    Create {
        /// Author name
        name: String,

        /// Comment text
        message: String,
    },

    /// Delete a comment
    Delete { id: i64 },

    /// Delete every comment
    DeleteAll,

    /// List all comments, then print new ones as they get posted
    Watch,
}

fn print_comment(c: &Comment) {
    println!("#{} {} ({})", c.id.0, c.name, c.created.to_rfc2822());
    for line in c.message.lines() {
        println!("    {line}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = Client::new(opt.host);

    match opt.cmd {
        Command::List => {
            let board = CommentBoard::from_fetched(client.fetch_comments().await?);
            board.comments().iter().for_each(print_comment);
        }
        Command::Get { id } => print_comment(&client.fetch_comment(CommentId(id)).await?),
        Command::Create { name, message } => {
            let c = NewComment::new(name, message);
            let mut board = CommentBoard::default();
            if !board.check_submission(&c) {
                anyhow::bail!("{}", board.error().unwrap_or("invalid comment"));
            }
            let created = client.create_comment(&c).await?;
            println!("created comment #{}", created.id.0);
        }
        Command::Delete { id } => {
            let res = client.delete_comment(CommentId(id)).await?;
            println!("deleted {} comment(s)", res.deleted_count);
        }
        Command::DeleteAll => {
            let res = client.delete_comments().await?;
            println!("deleted {} comment(s)", res.deleted_count);
        }
        Command::Watch => {
            let mut feed = client.comment_feed();
            let mut board = CommentBoard::from_fetched(client.fetch_comments().await?);
            board.comments().iter().rev().for_each(print_comment);
            while let Some(item) = feed.next().await {
                match item {
                    Ok(c) => {
                        if board.merge(c.clone()) {
                            print_comment(&c);
                        }
                    }
                    Err(e) => {
                        board.record_feed_error(&e);
                        eprintln!("{}: {e}", board.error().unwrap_or("error"));
                    }
                }
            }
            eprintln!("comment feed is over, state {:?}", feed.state());
        }
    }

    Ok(())
}
